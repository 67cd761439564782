//! RepeatAsync: like Repeat, but each packet goes out on a later turn.

use std::rc::Rc;

use wf_core::{FlowResult, Packet, Scheduler};
use wf_network::{AsyncComponent, AsyncHandler, AsyncJob, ComponentBase};
use wf_ports::Port;

/// The handler; build the component with [`RepeatAsync::component`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RepeatAsync;

impl RepeatAsync {
    pub fn component(scheduler: Rc<Scheduler>) -> FlowResult<AsyncComponent> {
        let base = ComponentBase::new("Like 'Repeat', except repeat on the next turn");
        base.set_icon("step-forward");
        base.in_ports.add("in", Port::new("all"));
        base.out_ports.add("out", Port::new("all"));
        AsyncComponent::new(base, scheduler, RepeatAsync)
    }
}

impl AsyncHandler for RepeatAsync {
    fn do_async(&self, packet: Packet, job: AsyncJob) -> FlowResult<()> {
        let scheduler = Rc::clone(job.scheduler());
        scheduler.defer(move || {
            let sent = job.out().send(packet);
            job.finish(sent)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feed, tap};
    use serde_json::json;

    #[test]
    fn repeats_later_in_order() {
        let scheduler = Rc::new(Scheduler::new());
        let component = RepeatAsync::component(Rc::clone(&scheduler)).unwrap();
        let input = feed(&component, "in");
        let out = tap(&component, "out");

        input.begin_group("g").unwrap();
        input.send(json!(1)).unwrap();
        input.send(json!(2)).unwrap();
        input.end_group().unwrap();
        input.disconnect().unwrap();
        // the group opens right away; packets wait for the scheduler
        assert_eq!(*out.borrow(), vec!["connect", "<g"]);

        scheduler.run_until_idle().unwrap();
        assert_eq!(
            *out.borrow(),
            vec!["connect", "<g", "1", "2", ">", "disconnect"]
        );
        assert_eq!(component.load(), 0);
    }
}
