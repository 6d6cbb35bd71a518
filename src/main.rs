use std::io;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use clickflow_core::{logger, platform::hotkey, settings::Settings, workflow::Workflow};
use clickflow_tui::app::settings_path;

struct Args {
    workflow: Option<PathBuf>,
    force_stub: bool,
    loops: Option<u32>,
    no_debug: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { workflow: None, force_stub: false, loops: None, no_debug: false };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--stub" => args.force_stub = true,
            "--no-debug" => args.no_debug = true,
            "--loops" => {
                let n = it.next().context("--loops needs a number")?;
                args.loops = Some(n.parse().with_context(|| format!("bad loop count: {}", n))?);
            }
            s if s.starts_with("--") => bail!("unknown option {}\nusage: clickflow [WORKFLOW.json] [--stub] [--loops N] [--no-debug]", s),
            _ => args.workflow = Some(PathBuf::from(arg)),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let settings_path = settings_path();
    let mut settings = Settings::load(&settings_path);
    if args.no_debug {
        settings.debug_mode = false;
    }

    logger::init(&settings.debug_dir);

    // Explicit path, else whatever was open last time.
    let workflow_path = args.workflow.or_else(|| settings.last_workflow.clone().filter(|p| p.is_file()));
    let mut workflow = match &workflow_path {
        Some(path) => Workflow::load(path)?,
        None => Workflow::new(Vec::new()),
    };
    if let Some(n) = args.loops {
        workflow = workflow.with_loops(n);
    }
    if args.no_debug {
        workflow.debug_mode = false;
    }

    // Channels
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);
    match &workflow_path {
        Some(p) => logger::info(&format!("loaded {} step(s) from {}", workflow.steps.len(), p.display())),
        None => logger::warn("no workflow given: clickflow WORKFLOW.json"),
    }

    // Global emergency stop (Ctrl+Alt+X)
    let emergency = Arc::new(AtomicBool::new(false));
    if hotkey::start_emergency_listener(Arc::clone(&emergency)) {
        logger::info(&format!("emergency stop: {}", hotkey::EMERGENCY_COMBO));
    } else {
        logger::warn("global emergency hotkey unavailable, use x in this window");
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = clickflow_tui::App::new(workflow, workflow_path, settings, args.force_stub, log_rx);
    let result = clickflow_tui::event::run(&mut terminal, &mut app, &emergency);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}
