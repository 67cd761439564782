mod serve;

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{Level, info};
use wf_components::register_core;
use wf_core::Scheduler;
use wf_graph::load_file;
use wf_network::{ComponentLoader, NetworkEvent};
use wf_ports::SocketEvent;
use wf_runtime::{GraphProvider, ProviderOptions, Runtime, RuntimeOptions, RuntimeResult};

#[derive(Parser)]
#[command(name = "wireflow")]
#[command(about = "wireflow CLI - run and inspect flow-based programming graphs", long_about = None)]
struct Cli {
    /// Increase log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph file and report what it contains
    Validate {
        /// Path to the graph file (JSON or YAML)
        graph_path: PathBuf,
    },
    /// Print a graph as Graphviz DOT
    Dot {
        /// Path to the graph file (JSON or YAML)
        graph_path: PathBuf,
        /// Print yUML instead of DOT
        #[arg(long)]
        yuml: bool,
    },
    /// List the core component library
    Components,
    /// Run a graph and print its network events
    Run {
        /// Path to the graph file (JSON or YAML)
        graph_path: PathBuf,
        /// Stop after this many milliseconds instead of waiting for idle
        #[arg(long)]
        duration_ms: Option<u64>,
        /// Base directory for resolving graph components (defaults to the graph's directory)
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// Speak the runtime protocol as JSON lines on stdin/stdout
    Serve {
        /// Base directory used for every graph the client builds
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
}

fn main() -> RuntimeResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { graph_path } => cmd_validate(&graph_path),
        Commands::Dot { graph_path, yuml } => cmd_dot(&graph_path, yuml),
        Commands::Components => cmd_components(),
        Commands::Run {
            graph_path,
            duration_ms,
            base_dir,
        } => cmd_run(&graph_path, duration_ms, base_dir.as_deref()),
        Commands::Serve { base_dir } => {
            serve::serve(base_dir.map(|dir| dir.to_string_lossy().into_owned()))
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn cmd_validate(graph_path: &Path) -> RuntimeResult<()> {
    println!("Validating graph: {}", graph_path.display());
    let graph = load_file(graph_path)?;
    println!("✓ Graph '{}' is valid", graph.name());
    println!("  Nodes: {}", graph.nodes().len());
    println!("  Edges: {}", graph.edges().len());
    println!("  Initial packets: {}", graph.initializers().len());
    println!("  Exports: {}", graph.exports().len());
    println!("  Groups: {}", graph.groups().len());
    Ok(())
}

fn cmd_dot(graph_path: &Path, yuml: bool) -> RuntimeResult<()> {
    let graph = load_file(graph_path)?;
    if yuml {
        println!("{}", graph.to_yuml());
    } else {
        println!("{}", graph.to_dot());
    }
    Ok(())
}

fn cmd_components() -> RuntimeResult<()> {
    let loader = ComponentLoader::new(".", Rc::new(Scheduler::new()));
    register_core(&loader);
    let runtime = Runtime::new(loader, RuntimeOptions::default());

    let listed = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&listed);
    runtime.add_listener(move |message| {
        if message.command == "component" {
            sink.borrow_mut().push(message.payload.clone());
        }
        Ok(())
    });
    runtime.receive("component", "list", Value::Null, None)?;
    runtime.run_until_idle()?;

    println!("Components:");
    for component in listed.borrow().iter() {
        println!(
            "  {} - {}",
            component["name"].as_str().unwrap_or_default(),
            component["description"].as_str().unwrap_or_default()
        );
        println!(
            "    in: {}  out: {}",
            port_list(&component["inPorts"]),
            port_list(&component["outPorts"])
        );
    }
    Ok(())
}

fn port_list(ports: &Value) -> String {
    let names: Vec<String> = ports
        .as_array()
        .map(|ports| {
            ports
                .iter()
                .map(|port| {
                    let id = port["id"].as_str().unwrap_or_default();
                    if port["array"].as_bool().unwrap_or(false) {
                        format!("{id}[]")
                    } else {
                        id.to_string()
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn cmd_run(
    graph_path: &Path,
    duration_ms: Option<u64>,
    base_dir: Option<&Path>,
) -> RuntimeResult<()> {
    let base_dir = base_dir
        .map(Path::to_path_buf)
        .or_else(|| graph_path.parent().map(Path::to_path_buf))
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    let base_dir = base_dir.to_string_lossy().into_owned();
    println!("Running graph: {}", graph_path.display());

    let scheduler = Rc::new(Scheduler::wall_clock());
    let loader = ComponentLoader::new(base_dir.clone(), Rc::clone(&scheduler));
    register_core(&loader);

    let provider = GraphProvider::new(&loader);
    let options = ProviderOptions::local(graph_path.to_string_lossy(), base_dir);
    provider.initialize(&options, |graph, network| {
        info!(graph = %graph.name(), processes = network.processes().len(), "network ready");
        network.on(|event| {
            println!("{}", describe(event));
            Ok(())
        });
        Ok(())
    })?;

    let turns = match duration_ms {
        Some(ms) => scheduler.run_for(Duration::from_millis(ms))?,
        None => scheduler.run_until_idle()?,
    };
    println!("✓ Finished after {} turns", turns);
    Ok(())
}

/// One printable line per network event.
fn describe(event: &NetworkEvent) -> String {
    match event {
        NetworkEvent::Start { start } => format!("start {}", start.to_rfc3339()),
        NetworkEvent::End { uptime, .. } => format!("end after {} ms", uptime.as_millis()),
        NetworkEvent::Socket(activity) => {
            let prefix = activity
                .subgraph_path()
                .map(|path| format!("[{path}] "))
                .unwrap_or_default();
            let detail = match &activity.event {
                SocketEvent::Connect => "CONN".to_string(),
                SocketEvent::BeginGroup(group) => format!("< {group}"),
                SocketEvent::Data(data) => format!("DATA {data}"),
                SocketEvent::EndGroup(Some(group)) => format!("> {group}"),
                SocketEvent::EndGroup(None) => ">".to_string(),
                SocketEvent::Disconnect => "DISC".to_string(),
            };
            format!("{prefix}{} {detail}", activity.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wf_network::SocketActivity;
    use wf_ports::Endpoint;

    #[test]
    fn socket_lines_carry_id_and_detail() {
        let event = NetworkEvent::Socket(SocketActivity {
            id: "Foo() OUT -> IN Bar()".into(),
            from: Some(Endpoint::new("Foo", "out")),
            to: Some(Endpoint::new("Bar", "in")),
            subgraph: vec!["Outer".into()],
            event: SocketEvent::Data(json!({"a": 1})),
        });
        assert_eq!(describe(&event), r#"[Outer] Foo() OUT -> IN Bar() DATA {"a":1}"#);
    }

    #[test]
    fn end_lines_report_uptime() {
        let event = NetworkEvent::End {
            start: Utc::now(),
            end: Utc::now(),
            uptime: Duration::from_millis(42),
        };
        assert_eq!(describe(&event), "end after 42 ms");
    }

    #[test]
    fn port_lists_mark_arrays() {
        let ports = json!([
            {"id": "in", "type": "all", "array": true},
            {"id": "options", "type": "object", "array": false}
        ]);
        assert_eq!(port_list(&ports), "in[], options");
        assert_eq!(port_list(&json!([])), "-");
    }
}
