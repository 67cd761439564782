//! JSON-lines transport: one `{protocol, command, payload}` object per line
//! in on stdin, one per line out on stdout.

use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};
use wf_components::register_core;
use wf_core::{FlowError, FlowResult, Scheduler};
use wf_network::ComponentLoader;
use wf_runtime::{Message, Runtime, RuntimeOptions, RuntimeResult, Transport};

/// Scheduler time run between two looks at the input queue.
const TICK: Duration = Duration::from_millis(5);

struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(
        &self,
        protocol: &str,
        command: &str,
        payload: &Value,
        context: Option<&Value>,
    ) -> FlowResult<()> {
        let message = Message {
            protocol: protocol.to_string(),
            command: command.to_string(),
            payload: payload.clone(),
            context: context.cloned(),
        };
        let line = serde_json::to_string(&message)
            .map_err(|err| FlowError::component(format!("cannot encode message: {err}")))?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")
            .and_then(|_| stdout.flush())
            .map_err(|err| FlowError::component(format!("cannot write message: {err}")))
    }
}

pub fn serve(base_dir: Option<String>) -> RuntimeResult<()> {
    let scheduler = Rc::new(Scheduler::wall_clock());
    let loader = ComponentLoader::new(base_dir.clone().unwrap_or_else(|| ".".into()), scheduler);
    register_core(&loader);
    let runtime = Runtime::new(
        loader,
        RuntimeOptions {
            base_dir,
            catch_errors: true,
        },
    );
    runtime.add_transport(Rc::new(StdoutTransport));
    info!("serving runtime protocol on stdin/stdout");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });
    serve_lines(&runtime, &rx)
}

/// Handle lines as they arrive, running timers in between.
///
/// Blocks on the queue only while the scheduler has nothing pending, so
/// debounced events like `network/stopped` go out without further input.
/// Returns once the sender hangs up and the remaining work is done.
fn serve_lines(runtime: &Runtime, lines: &Receiver<String>) -> RuntimeResult<()> {
    loop {
        let next = if runtime.scheduler().is_idle() {
            lines.recv().map_err(|_| TryRecvError::Disconnected)
        } else {
            lines.try_recv()
        };
        match next {
            Ok(line) => handle_line(runtime, &line)?,
            Err(TryRecvError::Empty) => {
                runtime.run_for(TICK)?;
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
    runtime.run_until_idle()?;
    Ok(())
}

/// Dispatch one input line, then run whatever became due.
fn handle_line(runtime: &Runtime, line: &str) -> RuntimeResult<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Message>(line) {
        Ok(message) => runtime.receive_message(message)?,
        Err(err) => {
            warn!(error = %err, "unreadable message");
            runtime.send(
                "runtime",
                "error",
                json!({ "message": format!("Invalid message: {err}") }),
                None,
            )?;
        }
    }
    runtime.run_for(Duration::ZERO)?;
    Ok(())
}
