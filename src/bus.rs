//! The inter-core message bus. Cores have no other way to influence each
//! other's control flow: IRQ delivery, forced halt, and suspend/wake all
//! travel through here as addressed messages with an acknowledgement the
//! sender can wait on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// A wake handle passed to `SuspendCore`: the suspended core blocks on the
/// pair's condvar until another party notifies it (or a `HaltCore`/`die`
/// forces it awake regardless).
pub type WakeEvent = Arc<(Mutex<bool>, Condvar)>;

pub fn new_wake_event() -> WakeEvent {
    Arc::new((Mutex::new(false), Condvar::new()))
}

pub fn signal(event: &WakeEvent) {
    let (lock, cv) = &**event;
    *lock.lock().unwrap() = true;
    cv.notify_all();
}

pub fn wait(event: &WakeEvent) {
    let (lock, cv) = &**event;
    let mut fired = lock.lock().unwrap();
    while !*fired {
        fired = cv.wait(fired).unwrap();
    }
}

#[derive(Clone)]
pub enum Message {
    /// A hardware IRQ arrived from `source`'s IRQ vector table index.
    HandleIrq { source: u8 },
    /// Force the receiving core to stop running at its next event check.
    HaltCore,
    /// Arm a suspension that blocks the receiving core at its next event
    /// check until `wake` is signalled.
    SuspendCore { wake: WakeEvent },
}

/// A single delivered message plus the acknowledgement the sender can
/// observe once the receiver has actually consumed it.
pub struct Delivery {
    pub message: Message,
    ack: WakeEvent,
}

impl Delivery {
    pub fn delivered(&self) {
        signal(&self.ack);
    }
}

struct Endpoint {
    queue: Mutex<VecDeque<Delivery>>,
    cv: Condvar,
}

impl Endpoint {
    fn new() -> Self {
        Endpoint { queue: Mutex::new(VecDeque::new()), cv: Condvar::new() }
    }
}

/// FIFO-per-endpoint message bus shared by every core in a machine.
pub struct MessageBus {
    endpoints: Mutex<HashMap<u32, Arc<Endpoint>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus { endpoints: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, endpoint_id: u32) {
        self.endpoints.lock().unwrap().entry(endpoint_id).or_insert_with(|| Arc::new(Endpoint::new()));
    }

    /// Deliver `message` to `endpoint_id`, returning the ack handle. Panics
    /// if the endpoint was never registered — a programming error in the
    /// supervisor, not a runtime condition.
    pub fn send(&self, endpoint_id: u32, message: Message) -> WakeEvent {
        let endpoints = self.endpoints.lock().unwrap();
        let endpoint = endpoints.get(&endpoint_id).expect("send to unregistered endpoint").clone();
        drop(endpoints);
        let ack = new_wake_event();
        endpoint.queue.lock().unwrap().push_back(Delivery { message, ack: ack.clone() });
        endpoint.cv.notify_all();
        ack
    }

    /// Non-blocking poll: pop one pending message for `endpoint_id` if any.
    pub fn poll(&self, endpoint_id: u32) -> Option<Delivery> {
        let endpoint = self.endpoints.lock().unwrap().get(&endpoint_id)?.clone();
        endpoint.queue.lock().unwrap().pop_front()
    }

    /// Put an undelivered message back at the front of `endpoint_id`'s
    /// queue. Used to leave a masked IRQ queued in place without acking it,
    /// while still observing FIFO order on the next poll.
    pub fn requeue_front(&self, endpoint_id: u32, delivery: Delivery) {
        if let Some(endpoint) = self.endpoints.lock().unwrap().get(&endpoint_id) {
            endpoint.queue.lock().unwrap().push_front(delivery);
        }
    }

    /// Blocking receive: wait until a message is available for
    /// `endpoint_id`, then pop and return it.
    pub fn recv_blocking(&self, endpoint_id: u32) -> Delivery {
        let endpoint = self.endpoints.lock().unwrap().get(&endpoint_id).expect("unregistered endpoint").clone();
        let mut queue = endpoint.queue.lock().unwrap();
        loop {
            if let Some(delivery) = queue.pop_front() {
                return delivery;
            }
            queue = endpoint.cv.wait(queue).unwrap();
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
