use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarCard, CalendarModel, DAYS_PER_WEEK, HOURS_PER_DAY, slot_index};
use crate::config::Config;
use crate::task::{Priority, Status};
use crate::task_list::{Progress, TaskListModel};

const PROGRESS_BAR_WIDTH: usize = 20;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let enabled = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self {
            color: enabled && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, model), fields(cards = model.cards.len()))]
    pub fn print_task_list(&self, model: &TaskListModel) -> anyhow::Result<()> {
        self.write_task_list(io::stdout().lock(), model)
    }

    pub fn write_task_list<W: Write>(&self, mut out: W, model: &TaskListModel) -> anyhow::Result<()> {
        if let Some(message) = model.empty_message {
            writeln!(out, "{message}")?;
        } else {
            let headers = ["ID", "Priority", "Status", "Title", "Created"]
                .map(str::to_string)
                .to_vec();
            let rows = model
                .cards
                .iter()
                .map(|card| {
                    let title = if card.description.is_empty() {
                        card.title.clone()
                    } else {
                        format!("{} - {}", card.title, card.description)
                    };
                    vec![
                        self.paint(&card.id.to_string(), "33"),
                        self.paint(card.priority_badge, priority_color(card.priority)),
                        self.paint(card.status_label, status_color(card.status)),
                        title,
                        card.created.clone(),
                    ]
                })
                .collect();
            write_table(&mut out, headers, rows)?;
        }

        writeln!(out)?;
        self.write_progress(&mut out, &model.progress)?;
        Ok(())
    }

    pub fn print_progress(&self, progress: &Progress) -> anyhow::Result<()> {
        self.write_progress(io::stdout().lock(), progress)
    }

    pub fn write_progress<W: Write>(&self, mut out: W, progress: &Progress) -> anyhow::Result<()> {
        let filled = PROGRESS_BAR_WIDTH * progress.percentage as usize / 100;
        let bar = format!(
            "[{}{}]",
            self.paint(&"#".repeat(filled), "32"),
            "-".repeat(PROGRESS_BAR_WIDTH - filled)
        );
        writeln!(
            out,
            "Progress: {}/{} ({}%) {bar}",
            progress.completed, progress.total, progress.percentage
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, model), fields(week = %model.week_label))]
    pub fn print_calendar(&self, model: &CalendarModel, all_hours: bool) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), model, all_hours)
    }

    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        model: &CalendarModel,
        all_hours: bool,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&model.week_label, "1"))?;
        writeln!(out)?;

        let mut headers = vec![String::new()];
        headers.extend(
            model
                .day_headers
                .iter()
                .map(|header| format!("{} {}", header.weekday, header.day)),
        );

        let mut rows = Vec::new();
        for hour in 0..HOURS_PER_DAY {
            let cells: Vec<String> = (0..DAYS_PER_WEEK)
                .map(|day| {
                    model.slots[slot_index(day, hour)]
                        .iter()
                        .map(|card| self.calendar_card(card))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            if !all_hours && cells.iter().all(String::is_empty) {
                continue;
            }

            let mut row = vec![model.hour_labels[hour as usize].clone()];
            row.extend(cells);
            rows.push(row);
        }

        if rows.is_empty() {
            writeln!(out, "No scheduled tasks this week")?;
        } else {
            write_table(&mut out, headers, rows)?;
        }

        writeln!(out)?;
        writeln!(out, "Unscheduled:")?;
        if model.unscheduled.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for card in &model.unscheduled {
            writeln!(out, "  {} {}", self.paint(&card.id.to_string(), "33"), self.calendar_card(card))?;
        }
        Ok(())
    }

    fn calendar_card(&self, card: &CalendarCard) -> String {
        let title = self.paint(&card.title, priority_color(card.priority));
        match &card.time_label {
            Some(time) => format!("{title} ({time})"),
            None => title,
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "32",
        Priority::Medium => "33",
        Priority::High => "31",
    }
}

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Todo => "37",
        Status::InProgress => "36",
        Status::Completed => "2",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::calendar::CalendarView;
    use crate::task::{Task, TaskDraft, TaskId, TaskPatch};
    use crate::task_list::{EditMode, TaskListView};

    fn task(id: u64, title: &str) -> Task {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 12, 8, 0, 0)
            .single()
            .expect("valid now");
        Task::from_draft(TaskId(id), TaskDraft::titled(title), now)
    }

    fn to_string(write: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
        let mut buf = Vec::new();
        write(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn task_list_table_and_progress() {
        let mut done = task(2, "Ship");
        done.apply_patch(TaskPatch::status(Status::Completed));
        let view = TaskListView::new(vec![task(1, "Plan"), done], EditMode::InPlace, chrono_tz::UTC);

        let text = to_string(|buf| Renderer::plain().write_task_list(buf, &view.render()));
        assert!(text.contains("Low Priority"));
        assert!(text.contains("Completed"));
        assert!(text.contains("Progress: 1/2 (50%) [##########----------]"));
    }

    #[test]
    fn empty_task_list_prints_message() {
        let view = TaskListView::new(vec![], EditMode::InPlace, chrono_tz::UTC);
        let text = to_string(|buf| Renderer::plain().write_task_list(buf, &view.render()));
        assert!(text.starts_with("No tasks found"));
        assert!(text.contains("(0%)"));
    }

    #[test]
    fn calendar_lists_scheduled_rows_and_unscheduled() {
        let mut scheduled = task(1, "Standup");
        scheduled.date = Utc.with_ymd_and_hms(2026, 10, 13, 9, 30, 0).single();
        let view = CalendarView::new(
            vec![scheduled, task(2, "Someday")],
            NaiveDate::from_ymd_opt(2026, 10, 14).expect("date"),
            chrono_tz::UTC,
        );
        let model = view.render().expect("render");

        let text = to_string(|buf| Renderer::plain().write_calendar(buf, &model, false));
        assert!(text.starts_with("Oct 11, 2026 - Oct 17, 2026"));
        assert!(text.contains("Tue 13"));
        assert!(text.contains("9AM"));
        assert!(text.contains("Standup (9:30 AM)"));
        assert!(!text.contains("10AM"));
        assert!(text.contains("  2 Someday"));

        let full = to_string(|buf| Renderer::plain().write_calendar(buf, &model, true));
        assert!(full.contains("11PM"));
    }

    #[test]
    fn color_setting_comes_from_config() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).expect("renderer").color);

        cfg.apply_overrides(vec![("color".to_string(), "purple".to_string())]);
        let err = Renderer::new(&cfg).expect_err("bad color");
        assert!(err.to_string().contains("invalid color setting"));
    }

    #[test]
    fn strips_ansi_for_width() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
