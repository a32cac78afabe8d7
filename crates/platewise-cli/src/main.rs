//! `platewise-cli` – platewise Command Line Interface
//!
//! This binary is the entry point for the recommender.  It:
//!
//! 1. Loads `.env`, installs tracing and checks for
//!    `~/.platewise/config.toml`; runs a **First-Run Wizard** (which also
//!    writes the starter dish catalog) when the file is absent.
//! 2. Calls [`platewise_runtime::initialize`] once with the resolved
//!    settings and builds the orchestrator.  A missing catalog aborts here.
//! 3. Either serves the web UI headless (`platewise serve`) or drops the
//!    user into an **interactive REPL** (`/ask`, `/like`, `/profile`, …).
//! 4. Intercepts **Ctrl-C** to stop cleanly; a second Ctrl-C exits at once.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use platewise_runtime::{build_orchestrator, initialize, init_tracing, llm_reasoner};
use platewise_types::PlateError;
use platewise_web::WebServer;

fn main() {
    // A missing `.env` is normal.
    let _ = dotenvy::dotenv();
    let guard = init_tracing("platewise-cli");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown_clone.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        println!("{}", "  Press Enter (or Ctrl-C again) to leave.".dimmed());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let code = match run(shutdown) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "platewise stopped");
            println!("{}: {}", "Fatal".red().bold(), e);
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

fn run(shutdown: Arc<AtomicBool>) -> Result<(), PlateError> {
    let headless = std::env::args().nth(1).as_deref() == Some("serve");

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) if headless => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Bootstrap ─────────────────────────────────────────────────────────
    let settings = initialize(cfg.to_settings())?;
    if settings.api_key.is_none() {
        println!(
            "  {}  Set {} for personalised ranking; falling back to ratings.",
            "No API key found.".yellow(),
            "PLATEWISE_API_KEY".bold()
        );
    }
    let orchestrator = build_orchestrator(settings, Box::new(llm_reasoner(settings)))?;
    let stats = orchestrator.catalog().stats();
    info!(dishes = stats.total, cuisines = stats.cuisines, "catalog ready");
    for warning in orchestrator.store().warnings() {
        println!("  {} {}", "⚠".yellow(), warning);
    }
    println!(
        "  Catalog: {} dishes across {} cuisines. Model: {}",
        stats.total.to_string().bold(),
        stats.cuisines,
        settings.model.yellow()
    );

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| PlateError::Initialization(format!("tokio runtime: {e}")))?;
    let shared = Arc::new(Mutex::new(orchestrator));

    if headless {
        let server = WebServer::shared(shared)
            .with_port(cfg.webui_port)
            .with_default_user(cfg.user_id.clone());
        return runtime.block_on(async move {
            let bound = server.bind().await?;
            let port = bound.local_addr()?.port();
            println!(
                "  Web UI on {}. Ctrl-C to stop.",
                format!("http://localhost:{port}").bold()
            );
            tokio::select! {
                result = bound.serve() => result,
                _ = wait_for(shutdown) => Ok(()),
            }
        });
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::Repl::new(runtime.handle().clone(), shared, cfg).run(shutdown);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

async fn wait_for(flag: Arc<AtomicBool>) {
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    while !flag.load(Ordering::SeqCst) {
        tick.tick().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      platewise First-Run Wizard      ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up platewise.\n");

    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);

    cfg.llm_url = repl::prompt_str(
        &format!("  Reasoning service URL (OpenAI-compatible) [{}]: ", cfg.llm_url),
        &cfg.llm_url,
    );
    cfg.model = repl::prompt_str(&format!("  Model [{}]: ", cfg.model), &cfg.model);
    cfg.user_id = repl::prompt_str(&format!("  Your user id [{}]: ", cfg.user_id), &cfg.user_id);
    cfg.webui_port = repl::prompt_u16(
        &format!("  Web UI HTTP port [{}]: ", cfg.webui_port),
        cfg.webui_port,
    );

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    match platewise_catalog::ensure_catalog_file(&cfg.catalog_path) {
        Ok(true) => println!(
            "  {} Starter catalog written to {}",
            "✓".green().bold(),
            cfg.catalog_path.display().to_string().bold()
        ),
        Ok(false) => {}
        Err(e) => println!("{}: {}", "Error writing catalog".red(), e),
    }
    if config::api_key_from_env().is_none() {
        println!(
            "  {}  Put {} in your environment or a .env file.",
            "Tip:".cyan(),
            "PLATEWISE_API_KEY=…".bold()
        );
    }
    println!();
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"        __      __               _         "#.bold().cyan());
    println!("{}", r#"   ___ / /__ _ / /____ _    __ (_)__ ___ "#.bold().cyan());
    println!("{}", r#"  / _ \/ / _ `// __/ -_) |/|/ // (_-</ -_)"#.bold().cyan());
    println!("{}", r#" / .__/_/\_,_/ \__/\__/|__,__//_/___/\__/ "#.bold().cyan());
    println!("{}", r#"/_/                                       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "platewise".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Personalised dish recommendations");
    println!();
}
