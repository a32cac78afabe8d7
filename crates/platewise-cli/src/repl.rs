//! REPL – Read-Eval-Print Loop for the platewise interactive shell.
//!
//! Supported slash-commands:
//!   /ask <query>                       – recommend dishes (plain text also asks)
//!   /like <dish_id> [rating] [comment] – positive feedback on a shown dish
//!   /dislike <dish_id> [rating] [comment]
//!   /history                           – past orders and feedback
//!   /profile                           – the preference summary the ranker sees
//!   /catalog                           – catalog statistics and dishes
//!   /demo                              – load the sample user and switch to it
//!   /user <id>                         – act as another user
//!   /settings                          – edit `~/.platewise/config.toml`
//!   /serve                             – start the web UI in the background
//!   /quit | /exit                      – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use platewise_memory::SAMPLE_USER_ID;
use platewise_types::{Fallback, Feedback, Recommendation, Signal};
use platewise_web::{SharedOrchestrator, WebServer};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::{self, Config};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Feedback {
        dish_id: String,
        signal: Signal,
        rating: Option<f32>,
        comment: String,
    },
    History,
    Profile,
    Catalog,
    Demo,
    User(String),
    Settings,
    Serve,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

/// Parse one input line.  Anything that is not a slash-command is a query.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Ask(line.to_string());
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/ask" if rest.is_empty() => Command::Invalid("usage: /ask <what you feel like>".into()),
        "/ask" => Command::Ask(rest.to_string()),
        "/like" => parse_feedback(Signal::Like, rest),
        "/dislike" => parse_feedback(Signal::Dislike, rest),
        "/history" => Command::History,
        "/profile" => Command::Profile,
        "/catalog" => Command::Catalog,
        "/demo" => Command::Demo,
        "/user" if rest.is_empty() => Command::Invalid("usage: /user <id>".into()),
        "/user" => Command::User(rest.to_string()),
        "/settings" => Command::Settings,
        "/serve" => Command::Serve,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command '{other}'")),
    }
}

fn parse_feedback(signal: Signal, rest: &str) -> Command {
    let mut words = rest.split_whitespace();
    let Some(dish_id) = words.next() else {
        return Command::Invalid(format!("usage: /{signal} <dish_id> [rating 1-5] [comment]"));
    };
    let mut words = words.peekable();
    let rating = words.peek().and_then(|w| w.parse::<f32>().ok());
    if let Some(rating) = rating {
        if !rating.is_finite() {
            return Command::Invalid("rating must be a number from 1 to 5".into());
        }
        words.next();
    }
    Command::Feedback {
        dish_id: dish_id.to_uppercase(),
        signal,
        rating,
        comment: words.collect::<Vec<_>>().join(" "),
    }
}

/// Interactive shell state.
pub struct Repl {
    runtime: Handle,
    orchestrator: SharedOrchestrator,
    cfg: Config,
    user: String,
    web: Option<JoinHandle<()>>,
}

impl Repl {
    pub fn new(runtime: Handle, orchestrator: SharedOrchestrator, cfg: Config) -> Self {
        let user = cfg.user_id.clone();
        Self {
            runtime,
            orchestrator,
            cfg,
            user,
            web: None,
        }
    }

    /// Read commands until EOF, `/quit` or the `shutdown` flag is set.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            print!("{} ", format!("platewise({})>", self.user).bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break, // EOF
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            match parse_command(&line) {
                Command::Empty => {}
                Command::Ask(query) => self.cmd_ask(&query),
                Command::Feedback {
                    dish_id,
                    signal,
                    rating,
                    comment,
                } => self.cmd_feedback(&dish_id, signal, rating, comment),
                Command::History => self.cmd_history(),
                Command::Profile => self.cmd_profile(),
                Command::Catalog => self.cmd_catalog(),
                Command::Demo => self.cmd_demo(),
                Command::User(user) => {
                    self.user = user;
                    println!("  Now acting as {}.", self.user.bold());
                }
                Command::Settings => cmd_settings(&mut self.cfg),
                Command::Serve => self.cmd_serve(),
                Command::Help => cmd_help(),
                Command::Quit => {
                    println!("{}", "Goodbye.".green());
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                Command::Invalid(msg) => println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    msg.yellow(),
                    "/help".bold()
                ),
            }
        }

        if let Some(web) = self.web.take() {
            web.abort();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Command handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn cmd_ask(&self, query: &str) {
        println!("  {}", "Thinking …".dimmed());
        let orchestrator = Arc::clone(&self.orchestrator);
        let rec = self.runtime.block_on(async {
            let mut orch = orchestrator.lock().await;
            orch.recommend(&self.user, query).await
        });
        self.print_recommendation(&rec);
    }

    fn print_recommendation(&self, rec: &Recommendation) {
        for fallback in &rec.fallbacks {
            println!("  {} {}", "⚠".yellow(), describe_fallback(fallback).dimmed());
        }
        println!();
        println!("  {}", rec.rationale.italic());
        if rec.is_empty() {
            println!();
            return;
        }
        let orch = self.runtime.block_on(self.orchestrator.lock());
        for (rank, item) in rec.items.iter().enumerate() {
            let Some(dish) = orch.catalog().get(&item.dish_id) else {
                continue;
            };
            println!();
            println!(
                "  {}. {} {} ",
                rank + 1,
                dish.name.bold(),
                format!("[{}]", dish.id).dimmed()
            );
            println!(
                "     {} · {} · ₹{:.0} · ★ {:.1}",
                dish.restaurant, dish.cuisine, dish.price, dish.rating
            );
            println!("     {}", item.rationale);
        }
        println!();
        println!(
            "  Use {} or {} to teach me your taste.",
            "/like <id>".bold().cyan(),
            "/dislike <id>".bold().cyan()
        );
        println!();
    }

    fn cmd_feedback(&self, dish_id: &str, signal: Signal, rating: Option<f32>, comment: String) {
        let mut feedback = Feedback::new(signal).with_comment(comment);
        if let Some(rating) = rating {
            feedback = feedback.with_rating(rating);
        }
        let result = self.runtime.block_on(async {
            self.orchestrator
                .lock()
                .await
                .record_feedback(&self.user, dish_id, feedback)
        });
        match result {
            Ok(status) if status.is_saved() => {
                println!("  {} Noted your {} for {}.", "✓".green().bold(), signal, dish_id.bold())
            }
            Ok(_) => println!(
                "  {} Noted your {} for {} (this session only; memory could not be saved).",
                "✓".yellow().bold(),
                signal,
                dish_id.bold()
            ),
            Err(e) => println!("  {}: {}", "Error".red(), e),
        }
    }

    fn cmd_history(&self) {
        let record = self.profile();
        let permanent = &record.permanent;
        println!("{}", format!("History for {}", record.user_id).bold().underline());
        if permanent.order_history.is_empty() {
            println!("  No orders yet.");
        }
        for order in permanent.order_history.iter().rev() {
            println!(
                "  {}  {} ({}) ₹{:.0}",
                order.timestamp.format("%Y-%m-%d").to_string().dimmed(),
                order.dish_name.bold(),
                order.restaurant,
                order.price
            );
        }
        if !permanent.recent_feedback.is_empty() {
            println!();
            println!("{}", "Recent feedback".bold());
            for fb in permanent.recent_feedback.iter().rev() {
                let mark = match fb.signal {
                    Signal::Like => "👍",
                    Signal::Dislike => "👎",
                };
                println!("  {mark} {} {}", fb.dish_name.bold(), fb.comment.dimmed());
            }
        }
        if let Some(query) = &record.active.last_query {
            println!();
            println!("  Last query this session: {}", query.italic());
        }
    }

    fn cmd_profile(&self) {
        let record = self.profile();
        println!("{}", format!("Profile for {}", record.user_id).bold().underline());
        for line in record.summary().lines() {
            println!("  {line}");
        }
    }

    fn cmd_catalog(&self) {
        let orch = self.runtime.block_on(self.orchestrator.lock());
        let catalog = orch.catalog();
        let stats = catalog.stats();
        println!("{}", "Catalog".bold().underline());
        println!(
            "  {} dishes · {} vegetarian · {} cuisines · ₹{:.0}–₹{:.0} (avg ₹{:.0})",
            stats.total,
            stats.vegetarian,
            stats.cuisines,
            stats.min_price,
            stats.max_price,
            stats.average_price
        );
        for dish in catalog.all() {
            println!(
                "  {} {:<28} {:<16} ₹{:>4.0}  ★ {:.1}",
                dish.id.dimmed(),
                dish.name,
                dish.cuisine,
                dish.price,
                dish.rating
            );
        }
    }

    fn cmd_demo(&mut self) {
        let (record, status) = self.runtime.block_on(async { self.orchestrator.lock().await.seed_demo() });
        self.user = record.user_id.clone();
        println!(
            "  {} Loaded sample user {} with {} past orders{}.",
            "✓".green().bold(),
            SAMPLE_USER_ID.bold(),
            record.permanent.order_history.len(),
            if status.is_saved() { "" } else { " (not saved)" }
        );
    }

    fn cmd_serve(&mut self) {
        if self.web.as_ref().is_some_and(|h| !h.is_finished()) {
            println!("  Web UI already running on http://localhost:{}", self.cfg.webui_port);
            return;
        }
        let server = WebServer::shared(Arc::clone(&self.orchestrator))
            .with_port(self.cfg.webui_port)
            .with_default_user(self.user.clone());
        match self.runtime.block_on(server.bind()) {
            Ok(bound) => {
                let port = bound.local_addr().map(|a| a.port()).unwrap_or(self.cfg.webui_port);
                self.web = Some(self.runtime.spawn(async move {
                    if let Err(e) = bound.serve().await {
                        warn!(error = %e, "web UI stopped");
                    }
                }));
                println!(
                    "  {} Web UI on {}",
                    "✓".green().bold(),
                    format!("http://localhost:{port}").bold()
                );
            }
            Err(e) => println!("  {}: {}", "Error".red(), e),
        }
    }

    fn profile(&self) -> platewise_memory::MemoryRecord {
        self.runtime
            .block_on(async { self.orchestrator.lock().await.profile(&self.user) })
    }
}

/// One-line, user-facing description of a degraded step.
pub fn describe_fallback(fallback: &Fallback) -> String {
    match fallback {
        Fallback::ConstraintsUnavailable(why) => {
            format!("Could not narrow the catalog ({why}); searched everything.")
        }
        Fallback::ConstraintDropped(why) => format!("Ignored a filter: {why}"),
        Fallback::RankingUnavailable(why) => {
            format!("Could not rank personally ({why}); showing top-rated dishes.")
        }
        Fallback::MemoryUnavailable(why) => {
            format!("Could not read your history ({why}); starting fresh.")
        }
        Fallback::MemoryNotPersisted(why) => format!("History not saved: {why}"),
    }
}

fn cmd_help() {
    println!();
    println!("{}", "platewise Commands".bold().underline());
    println!("  {}  – recommend dishes (or just type)", "/ask <query>".bold().cyan());
    println!("  {}  – like a shown dish", "/like <id> [1-5] [comment]".bold().cyan());
    println!("  {}  – dislike a shown dish", "/dislike <id> [1-5] [comment]".bold().cyan());
    println!("  {}  – past orders and feedback", "/history".bold().cyan());
    println!("  {}  – what I know about your taste", "/profile".bold().cyan());
    println!("  {}  – list the dish catalog", "/catalog".bold().cyan());
    println!("  {}  – load the sample user", "/demo".bold().cyan());
    println!("  {}  – act as another user", "/user <id>".bold().cyan());
    println!("  {}  – edit ~/.platewise/config.toml", "/settings".bold().cyan());
    println!("  {}  – start the web UI", "/serve".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_settings(cfg: &mut Config) {
    println!("{}", "Settings Editor".bold().underline());
    println!("  Press Enter to keep the current value.");

    cfg.llm_url = prompt_str(&format!("  Reasoning URL [{}]: ", cfg.llm_url), &cfg.llm_url);
    cfg.model = prompt_str(&format!("  Model         [{}]: ", cfg.model), &cfg.model);
    cfg.webui_port = prompt_u16(&format!("  Web UI port   [{}]: ", cfg.webui_port), cfg.webui_port);
    cfg.user_id = prompt_str(&format!("  Default user  [{}]: ", cfg.user_id), &cfg.user_id);
    let timeout = prompt_str(
        &format!("  Timeout secs  [{}]: ", cfg.timeout_secs),
        &cfg.timeout_secs.to_string(),
    );
    match timeout.parse::<u64>() {
        Ok(secs) if secs > 0 => cfg.timeout_secs = secs,
        _ => println!("  {} '{}' ignored", "Warning:".yellow(), timeout),
    }

    match config::save(cfg) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!("  {}", "Reasoning settings take effect on the next start.".dimmed());
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a u16 value.  Returns `default` when the user presses Enter.
pub(crate) fn prompt_u16(msg: &str, default: u16) -> u16 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<u16>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid port number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub(crate) fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
