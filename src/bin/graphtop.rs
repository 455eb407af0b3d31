//! graphtop - Neo4j monitor.
//!
//! Follows one Neo4j endpoint (optionally every member of its causal cluster)
//! and prints a status line, or the raw snapshot as JSON, whenever a new
//! sample arrives.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use graphtop::driver::mock::MockConnector;
use graphtop::driver::{Connector, HttpConnector};
use graphtop::{Address, Credentials, Dashboard, MonitorConfig, PanelStatus, Snapshot};

/// Neo4j monitor.
#[derive(Parser)]
#[command(name = "graphtop", about = "Neo4j endpoint and cluster monitor", version = graphtop::VERSION)]
struct Args {
    /// Endpoint to monitor, host[:port].
    #[arg(default_value = "localhost:7474", env = "NEO4J_ADDRESS")]
    address: String,

    #[arg(short, long, default_value = "neo4j", env = "NEO4J_USER")]
    user: String,

    #[arg(short, long, default_value = "", env = "NEO4J_PASSWORD", hide_env_values = true)]
    password: String,

    /// Refresh interval in seconds.
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Follow every member of the endpoint's cluster.
    #[arg(long)]
    members: bool,

    /// Run against a simulated three-core cluster instead of a real server.
    #[arg(long)]
    demo: bool,

    /// Print snapshots as JSON lines.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("graphtop={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn format_bytes(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// One status line for a snapshot.
fn describe_snapshot(snapshot: &Snapshot) -> String {
    let mut parts = vec![
        snapshot.address.to_string(),
        snapshot.status_label(),
        format!("up {}s", snapshot.dbms_uptime().as_secs()),
        format!("cpu {:.1}%", snapshot.process_cpu_percent()),
        format!(
            "heap {:.1}% of {}",
            snapshot.heap_used_ratio() * 100.0,
            format_bytes(snapshot.memory.heap.committed)
        ),
        format!("store {}", format_bytes(snapshot.storage.sizes.total)),
    ];
    if let Some(queries) = &snapshot.queries {
        parts.push(format!("queries {}", queries.len()));
    }
    if let Some(transactions) = &snapshot.transactions {
        parts.push(format!("tx {}", transactions.len()));
    }
    if let Some(page_cache) = &snapshot.page_cache {
        if let Some(ratio) = page_cache.usage_ratio {
            parts.push(format!("page cache {:.1}%", ratio * 100.0));
        }
    }
    if let Some(cluster) = &snapshot.cluster {
        parts.push(format!("members {}", cluster.members.len()));
    }
    parts.join(" | ")
}

/// Opens a panel for every member the overview knows about.
fn track_all_members(dashboard: &mut Dashboard) {
    let members = dashboard.navigator().len();
    dashboard.home();
    for _ in 0..members {
        if let Err(e) = dashboard.track_focused() {
            warn!("cannot follow member: {}", e);
        }
        dashboard.page_down();
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(args.interval.max(1)));
    let (connector, address): (Arc<dyn Connector>, Address) = if args.demo {
        let (connector, layout) = MockConnector::causal_cluster();
        (Arc::new(connector), layout.leader)
    } else {
        let address = match Address::parse_with_default(&args.address, config.default_port) {
            Ok(address) => address,
            Err(e) => {
                error!("invalid address '{}': {}", args.address, e);
                std::process::exit(2);
            }
        };
        (Arc::new(HttpConnector::new(&config)), address)
    };

    let credentials = Credentials::new(args.user, args.password);
    let mut dashboard = match Dashboard::new(connector, config, address.clone(), credentials) {
        Ok(dashboard) => dashboard,
        Err(e) => {
            error!("cannot monitor {}: {}", address, e);
            std::process::exit(1);
        }
    };

    let dirty = Arc::new(AtomicBool::new(false));
    let d = dirty.clone();
    dashboard.set_redraw(move || d.store(true, Ordering::SeqCst));

    if args.members {
        if let Err(e) = dashboard.toggle_overview() {
            warn!("cluster overview unavailable: {}", e);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!(address = %address, "monitoring");
    let mut printed: HashMap<Address, (PanelStatus, i64)> = HashMap::new();
    let mut members_tracked = false;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        if !dirty.swap(false, Ordering::SeqCst) {
            continue;
        }

        if dashboard.overview_visible() && !members_tracked && !dashboard.navigator().is_empty() {
            track_all_members(&mut dashboard);
            members_tracked = true;
        }

        for panel in dashboard.panels() {
            let view = panel.view();
            let sampled_at = view.latest.as_ref().map_or(0, |s| s.sampled_at);
            let state = (view.status, sampled_at);
            if printed.get(panel.address()) == Some(&state) {
                continue;
            }
            printed.insert(panel.address().clone(), state);

            match (&view.latest, view.status) {
                (Some(snapshot), _) if args.json => match serde_json::to_string(snapshot.as_ref()) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("cannot serialize snapshot: {}", e),
                },
                (Some(snapshot), _) => println!("{}", describe_snapshot(snapshot)),
                (None, PanelStatus::Unavailable) => println!(
                    "{} | unavailable | {}",
                    panel.address(),
                    view.error.as_deref().unwrap_or("no data")
                ),
                (None, _) => {}
            }
        }
    }

    info!("shutting down");
    dashboard.exit();
}
