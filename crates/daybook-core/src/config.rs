use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::task_list::EditMode;

const CONFIG_ENV_VAR: &str =
  "DAYBOOKRC";
const CONFIG_FILE_NAME: &str =
  ".daybookrc";
const DISABLED_RC: &str = "/dev/null";

const DEFAULTS: [(&str, &str); 4] = [
  ("data.location", "~/.daybook"),
  ("default.command", "list"),
  ("color", "on"),
  ("edit.mode", "in-place")
];

/// Flat `key = value` settings,
/// layered defaults < rc files <
/// `--rc` overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// One meaningful rc line.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key: &'a str,
    value: &'a str
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match locate_rc(config_override) {
      | Some(path) => {
        info!(config = %path.display(), "loading config");
        let mut open = Vec::new();
        cfg.read_rc(&path, &mut open)?;
      }
      | None => warn!(
        "no daybookrc found; using \
         defaults"
      )
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = match k
        .strip_prefix("rc.")
      {
        | Some(rest) => rest.to_string(),
        | None => k
      };
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `Ok(None)` when unset; an error
  /// when set to something that is not
  /// a recognised switch value.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    parse_switch(raw)
      .map(Some)
      .ok_or_else(|| {
        anyhow!(
          "invalid {key} setting: \
           {raw} (expected on or off)"
        )
      })
  }

  pub fn edit_mode(
    &self
  ) -> anyhow::Result<EditMode> {
    match self.get("edit.mode") {
      | Some(raw) => raw
        .parse()
        .context("invalid edit.mode"),
      | None => Ok(EditMode::default())
    }
  }

  pub fn timezone(
    &self
  ) -> Option<String> {
    self
      .get("timezone")
      .filter(|tz| !tz.trim().is_empty())
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// Reads one rc file; `open` holds
  /// the include chain currently being
  /// read so a file never includes
  /// itself.
  #[tracing::instrument(skip(
    self, open
  ))]
  fn read_rc(
    &mut self,
    path: &Path,
    open: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());
    open.push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line_no = idx + 1;
      let parsed = parse_rc_line(
        raw_line
      )
      .with_context(|| {
        format!(
          "{}:{line_no}",
          path.display()
        )
      })?;

      match parsed {
        | None => {}
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | Some(RcLine::Include(
          target
        )) => {
          let include =
            resolve_include_path(
              &base_dir, target
            );
          debug!(
            include = %include.display(),
            line = line_no,
            "processing include"
          );
          if open.contains(&include) {
            warn!(include = %include.display(), "include cycle; skipping");
          } else if include.exists() {
            self
              .read_rc(&include, open)?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
      }
    }

    open.pop();
    Ok(())
  }
}

/// Strips comments and classifies a
/// line; blank lines yield `None`.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(rest) =
    line.strip_prefix("include ")
  {
    let target = rest.trim();
    if target.is_empty() {
      return Err(anyhow!(
        "include path cannot be empty"
      ));
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "invalid config line: {raw} \
         (expected key = value)"
      )
    })?;
  Ok(Some(RcLine::Setting {
    key: key.trim(),
    value: value.trim()
  }))
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(location)) => {
      expand_tilde(Path::new(&location))
    }
    | (None, None) => dirs::home_dir()
      .map(|home| home.join(".daybook"))
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory"
        )
      })?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--config`, then `$DAYBOOKRC`
/// (`/dev/null` disables), then
/// `~/.daybookrc` when present.
fn locate_rc(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(CONFIG_ENV_VAR)
  {
    return (rc_env != DISABLED_RC)
      .then(|| PathBuf::from(rc_env));
  }

  let candidate = dirs::home_dir()?
    .join(CONFIG_FILE_NAME);
  candidate
    .exists()
    .then_some(candidate)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> PathBuf {
  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    expanded
  } else {
    base_dir.join(expanded)
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_switch(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
