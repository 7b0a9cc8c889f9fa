//! The simulation driver: owns the node arena, the transfer arena, and the
//! event queue, and advances the virtual clock until it runs dry or passes
//! the requested horizon.

mod events;

use crate::config::NodeClassConfig;
use crate::engine::{EventQueue, SimTime};
use crate::error::Result;
use crate::node::{Node, NodeId, Transfer, TransferId};
use crate::stats::Summary;
use events::Event;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};

pub struct Simulation {
    nodes: Vec<Node>,
    transfers: Vec<Transfer>,
    queue: EventQueue<Event>,
    rng: StdRng,
}

impl Simulation {
    /// Build the node arena from the parsed configuration and seed each
    /// node's arrival and first failure.
    pub fn new(classes: &[NodeClassConfig], rng: StdRng) -> Result<Self> {
        let mut nodes = Vec::new();
        for class in classes {
            for i in 0..class.number {
                let id = NodeId(nodes.len());
                let name = format!("{}-{}", class.class_name, i);
                nodes.push(Node::new(id, name, class)?);
            }
        }

        let mut sim = Self {
            nodes,
            transfers: Vec::new(),
            queue: EventQueue::new(),
            rng,
        };

        let seeds: Vec<(NodeId, SimTime, SimTime)> = sim
            .nodes
            .iter()
            .map(|node| (node.id, node.arrival_time, node.average_lifetime))
            .collect();
        for (id, arrival_time, average_lifetime) in seeds {
            sim.queue.schedule(arrival_time, Event::Online(id));
            let fail_delay = arrival_time + sim.exp_rv(average_lifetime);
            sim.queue.schedule(fail_delay, Event::Fail(id));
        }

        Ok(sim)
    }

    /// The virtual time of the most recently processed event.
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn transfer(&self, id: TransferId) -> &Transfer {
        &self.transfers[id.0]
    }

    /// Run until the event queue empties or the next scheduled event falls
    /// after `max_t`. An infinite `max_t` paired with an infinite-mean timer
    /// (e.g. `average_uptime = infinity`) never terminates, since that
    /// event's own scheduled time is also infinite; callers passing an
    /// infinite horizon must ensure every node eventually fails or goes
    /// offline.
    pub fn run(&mut self, max_t: SimTime) -> Result<()> {
        while let Some(event) = self.queue.pop_ready(max_t) {
            events::dispatch(self, event);
        }
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        Summary::compute(self)
    }

    fn schedule(&mut self, delay: SimTime, event: Event) {
        self.queue.schedule(delay, event);
    }

    /// Draw an exponential random variable with the given mean. A mean of
    /// zero fires immediately; an infinite mean never fires within any
    /// finite horizon.
    fn exp_rv(&mut self, mean: SimTime) -> SimTime {
        if mean.is_infinite() {
            return SimTime::INFINITY;
        }
        if mean <= 0.0 {
            return 0.0;
        }
        let dist = Exp::new(1.0 / mean).expect("exponential rate must be positive");
        dist.sample(&mut self.rng)
    }
}
