//! `pal` – runs PAL's cognitive loop.
//!
//! 1. Loads `~/.pal/config.toml` (with `PAL_*` overrides), then applies the
//!    command-line flags on top.
//! 2. Wires the event bus, the optional WebSocket bridge to the broker, the
//!    sensor pump, memory recall and the speech backend into a
//!    [`CognitiveLoop`].
//! 3. Runs one cycle (`--once`) or cycles until **Ctrl-C**, which stops the
//!    loop at its next sleep boundary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use config::{Config, SpeechMethod};
use pal_memory::{GatewaySearch, LocalMemoryFiles, MemoryRecall, ToolGateway};
use pal_middleware::{EventBus, Transport, WsBridge};
use pal_perception::{BodySignals, PerceptionBuffer};
use pal_runtime::cognitive_loop::DEFAULT_INTERVAL;
use pal_runtime::speech::{RemotePlayer, RobotHost};
use pal_runtime::{CognitiveLoop, CycleReport, GatewayTts, LocalScript, SpeechBackend, SpeechGate};

/// Longest wait for an in-flight utterance before `--once` exits.
const ONCE_SPEECH_GRACE: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "pal", version, about = "PAL cognitive loop")]
struct Args {
    /// Cycle interval in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Disable speech output
    #[arg(long)]
    no_tts: bool,

    /// Speech backend
    #[arg(long, value_enum)]
    tts_method: Option<SpeechMethod>,

    /// Run a single cycle, print the result and exit
    #[arg(long)]
    once: bool,

    /// Minimum seconds between two utterances
    #[arg(long)]
    monologue_cooldown: Option<u64>,

    /// WebSocket URL of the pub/sub broker
    #[arg(long, env = "PAL_ENDPOINT")]
    endpoint: Option<String>,

    /// Write the effective configuration to ~/.pal/config.toml and exit
    #[arg(long)]
    init: bool,
}

fn main() {
    // Before the runtime exists so the OTLP exporter stays runtime-free.
    let tracing_guard = pal_runtime::init_tracing("pal");
    let args = Args::parse();

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    let cfg = apply_args(cfg, &args);

    if args.init {
        match config::save(&cfg) {
            Ok(()) => println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        }
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start Tokio runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, args.once, tracing_guard.is_exporting()));
}

/// Overlay command-line flags on the loaded configuration.
fn apply_args(mut cfg: Config, args: &Args) -> Config {
    if let Some(interval) = args.interval
        && interval > 0.0 {
            cfg.interval_secs = interval;
        }
    if args.no_tts {
        cfg.speech_enabled = false;
    }
    if let Some(method) = args.tts_method {
        cfg.speech_method = method;
    }
    if let Some(cooldown) = args.monologue_cooldown {
        cfg.speech_cooldown_secs = cooldown;
    }
    if let Some(endpoint) = &args.endpoint {
        cfg.transport_endpoint = endpoint.clone();
    }
    cfg
}

async fn run(cfg: Config, once: bool, exporting_spans: bool) {
    let bus = Arc::new(EventBus::default());
    let transport: Arc<dyn Transport> = if cfg.transport_endpoint.is_empty() {
        Arc::clone(&bus) as Arc<dyn Transport>
    } else {
        let (bridge, _task) = WsBridge::spawn(cfg.transport_endpoint.clone(), bus.clone());
        Arc::new(bridge)
    };

    let perception = Arc::new(PerceptionBuffer::new());
    let body = Arc::new(BodySignals::new());
    let _pump = pal_runtime::spawn_sensor_pump(&bus, perception.clone(), body.clone());

    let gateway = ToolGateway::new(&cfg.gateway_url, &cfg.gateway_token, &cfg.session_key);
    let memory = MemoryRecall::new(
        Arc::new(GatewaySearch::new(gateway.clone())),
        LocalMemoryFiles::new(PathBuf::from(&cfg.memory_workspace)),
    );

    let robot = RobotHost::new(&cfg.robot_user, &cfg.robot_host);
    let backend: Arc<dyn SpeechBackend> = match cfg.speech_method {
        SpeechMethod::Gateway => Arc::new(GatewayTts::new(gateway, RemotePlayer::new(robot))),
        SpeechMethod::Local => Arc::new(LocalScript::new(robot)),
    };
    let speech = SpeechGate::new(
        backend,
        cfg.speech_enabled,
        Duration::from_secs(cfg.speech_cooldown_secs),
    );

    let mut cognitive = CognitiveLoop::new(perception, body, memory, speech, transport)
        .with_interval(cycle_interval(cfg.interval_secs));

    print_settings(&cfg, exporting_spans);

    if once {
        match cognitive.run_cycle().await {
            Ok(report) => print_report(&report),
            Err(e) => println!("{}: {}", "Cycle failed".red(), e),
        }
        let waited = tokio::time::timeout(ONCE_SPEECH_GRACE, async {
            while cognitive.speech().is_busy() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        if waited.is_err() {
            warn!("speech still running at exit");
        }
        return;
    }

    let handle = cognitive.handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this cycle …".yellow().bold());
        handle.stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process to exit");
    }

    let cycles = cognitive.run().await;
    info!(cycles, "cognitive loop stopped");
    println!("  {} Stopped after {} cycle(s).", "✓".green(), cycles);
}

fn cycle_interval(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_INTERVAL)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ____  ___    __ "#.bold().cyan());
    println!("{}", r#"   / __ \/   |  / / "#.bold().cyan());
    println!("{}", r#"  / /_/ / /| | / /  "#.bold().cyan());
    println!("{}", r#" / ____/ ___ |/ /___"#.bold().cyan());
    println!("{}", r#"/_/   /_/  |_/_____/"#.bold().cyan());
    println!();
    println!("  {} {}", "PAL".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Affective cognition loop");
    println!();
}

fn print_settings(cfg: &Config, exporting_spans: bool) {
    let transport = if cfg.transport_endpoint.is_empty() {
        "local bus".to_string()
    } else {
        cfg.transport_endpoint.clone()
    };
    let speech = if cfg.speech_enabled {
        format!("{} (cooldown {}s)", cfg.speech_method, cfg.speech_cooldown_secs)
    } else {
        "off".to_string()
    };
    println!("  Interval:  {}s", cfg.interval_secs);
    println!("  Transport: {}", transport.dimmed());
    println!("  Gateway:   {}", cfg.gateway_url.dimmed());
    println!("  Speech:    {}", speech);
    if exporting_spans {
        println!("  Tracing:   {}", "OTLP export on".dimmed());
    }
    println!();
}

fn print_report(report: &CycleReport) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{}", "[Prompt]".bold());
    println!("{}", report.narration.style_prompt);
    println!();
    if report.monologue_published() {
        println!("{} {}", "[Monologue]".bold(), report.narration.monologue);
    } else {
        println!("{} {}", "[Monologue]".bold(), "(held back this cycle)".dimmed());
    }
    println!("{} {}", "[Emotion]".bold(), report.affect.emotion.to_string().cyan());
}
