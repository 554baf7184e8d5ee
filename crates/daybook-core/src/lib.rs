pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod events;
pub mod render;
pub mod shell;
pub mod storage;
pub mod store;
pub mod task;
pub mod task_list;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting daybook CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;
  let store = store::TaskStore::new(
    Box::new(storage)
  );

  let now = Utc::now();
  let tz = datetime::resolve_timezone(
    cfg.timezone().as_deref()
  );
  let today =
    datetime::to_local_date(now, &tz);
  let mut workspace =
    shell::Workspace::open(
      store,
      cfg.edit_mode()?,
      tz,
      today
    )?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let command = match cli.command {
    | Some(command) => command,
    | None => {
      let name = cfg
        .get("default.command")
        .unwrap_or_else(|| {
          "list".to_string()
        });
      debug!(command = %name, "using default command");
      cli::Command::from_default_name(
        &name
      )?
    }
  };

  commands::dispatch(
    &mut workspace,
    &cfg,
    &renderer,
    command,
    now
  )?;

  info!("done");
  Ok(())
}
