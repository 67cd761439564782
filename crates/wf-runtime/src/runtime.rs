//! The base transport: routes inbound messages to the protocols and hands
//! everything they send to the registered listeners.

use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use wf_core::{FlowError, FlowResult, ListenerId, Scheduler};
use wf_graph::Graph;
use wf_network::{ComponentContext, ComponentLoader, Network};

use crate::error::{RuntimeError, RuntimeResult};
use crate::message::{Message, Outbound};
use crate::protocol::{ComponentProtocol, GraphProtocol, NetworkProtocol};

/// Runtime-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Used instead of the `baseDir` a client sends with `clear`.
    pub base_dir: Option<String>,
    /// Report failures as `error` messages instead of returning them.
    pub catch_errors: bool,
}

/// Where outbound messages end up (a socket, a pipe, a window).
pub trait Transport {
    fn send(
        &self,
        protocol: &str,
        command: &str,
        payload: &Value,
        context: Option<&Value>,
    ) -> FlowResult<()>;
}

#[derive(Debug)]
pub struct Runtime {
    options: RuntimeOptions,
    ctx: ComponentContext,
    outbound: Outbound,
    graph: GraphProtocol,
    network: NetworkProtocol,
    component: ComponentProtocol,
}

impl Runtime {
    pub fn new(loader: Rc<ComponentLoader>, options: RuntimeOptions) -> Self {
        let mut ctx = loader.context();
        if let Some(base_dir) = &options.base_dir {
            ctx.base_dir = base_dir.clone();
        }
        let outbound = Outbound::default();
        Self {
            graph: GraphProtocol::new(outbound.clone(), options.base_dir.clone()),
            network: NetworkProtocol::new(outbound.clone()),
            component: ComponentProtocol::new(outbound.clone()),
            options,
            ctx,
            outbound,
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn loader(&self) -> &Rc<ComponentLoader> {
        &self.ctx.loader
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.ctx.scheduler
    }

    /// The graph built by the last `graph`/`clear`.
    pub fn graph(&self) -> Option<Rc<Graph>> {
        self.graph.graph()
    }

    /// The network built by the last `network`/`start`.
    pub fn network(&self) -> Option<Network> {
        self.network.network()
    }

    /// Observe every outbound message.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Message) -> FlowResult<()> + 'static,
    {
        self.outbound.on(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.outbound.off(id)
    }

    /// Deliver every outbound message to `transport`.
    pub fn add_transport(&self, transport: Rc<dyn Transport>) -> ListenerId {
        self.outbound.on(move |message| {
            transport.send(
                &message.protocol,
                &message.command,
                &message.payload,
                message.context.as_ref(),
            )
        })
    }

    /// Send a message of our own to the listeners.
    pub fn send(
        &self,
        protocol: &str,
        command: &str,
        payload: Value,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        self.outbound.send(protocol, command, payload, context)?;
        Ok(())
    }

    /// Handle one inbound message.
    pub fn receive(
        &self,
        protocol: &str,
        command: &str,
        payload: Value,
        context: Option<&Value>,
    ) -> RuntimeResult<()> {
        debug!(protocol, command, "runtime receive");
        let outcome = match protocol {
            "graph" => self.graph.receive(command, payload, context),
            "network" => self
                .network
                .receive(command, self.graph.graph(), &self.ctx, context),
            "component" => self.component.receive(command, &self.ctx.loader, context),
            other => Err(RuntimeError::UnknownProtocol(other.to_string())),
        };
        match outcome {
            Err(err) if self.options.catch_errors => {
                warn!(protocol, command, error = %err, "message failed");
                self.outbound.error(protocol, &err, context)?;
                Ok(())
            }
            other => other,
        }
    }

    pub fn receive_message(&self, message: Message) -> RuntimeResult<()> {
        self.receive(
            &message.protocol,
            &message.command,
            message.payload,
            message.context.as_ref(),
        )
    }

    /// Drive the scheduler until nothing is left to do.
    pub fn run_until_idle(&self) -> RuntimeResult<u64> {
        let scheduler = self.scheduler();
        let start = scheduler.turns();
        loop {
            match scheduler.run_until_idle() {
                Ok(_) => return Ok(scheduler.turns() - start),
                Err(err) => self.catch(err)?,
            }
        }
    }

    /// Drive the scheduler for `span` of scheduler time.
    pub fn run_for(&self, span: Duration) -> RuntimeResult<u64> {
        let scheduler = self.scheduler();
        let start = scheduler.turns();
        let deadline = scheduler.now() + span;
        loop {
            let remaining = deadline.saturating_sub(scheduler.now());
            match scheduler.run_for(remaining) {
                Ok(_) => return Ok(scheduler.turns() - start),
                Err(err) => self.catch(err)?,
            }
        }
    }

    fn catch(&self, err: FlowError) -> RuntimeResult<()> {
        if !self.options.catch_errors {
            return Err(err.into());
        }
        warn!(error = %err, "network error");
        self.network.report(&err)
    }
}
