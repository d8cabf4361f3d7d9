use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicUsize};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::{Arguments, Filter, FilterError, SignalEventListener};
use crate::context::{Clock, Context};
use crate::io::Output;
use crate::signal::{Signal, SignalId, Signals};
use crate::theory::Pitch;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

enum Command {
    Enqueue(Vec<Signal>),
    Cancel(SignalId),
    Shutdown,
}

struct Pending {
    time: u64,
    seq: u64,
    signal: Signal,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

type Sounding = (SignalId, u8, Pitch);

fn sounding_key(signal: &Signal) -> Sounding {
    (signal.id(), signal.channel(), signal.pitch())
}

/// The delivery scheduler, run as the last stage of a chain.
///
/// Signals handed to it are queued by time and sent to the output by a
/// background worker once the clock reaches them, in time order and in
/// arrival order among equal times. When a note is released upstream, every
/// still-queued signal with its id is dropped; queued note-offs for notes
/// that already sounded are requeued at the current time so nothing is left
/// hanging. A later note-off for a note released this way is not sent again.
pub struct Out {
    commands: Sender<Command>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Out {
    pub fn new(output: impl Output + 'static, clock: Arc<dyn Clock>) -> Self {
        Self::with_poll_interval(output, clock, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        output: impl Output + 'static,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        let (commands, command_rx) = crossbeam::channel::unbounded();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            queue: BinaryHeap::new(),
            next_seq: 0,
            sounding: HashSet::new(),
            released: HashSet::new(),
            output: Box::new(output),
            clock,
            pending: pending.clone(),
        };
        let handle = std::thread::spawn(move || worker.run(command_rx, poll_interval));

        Self {
            commands,
            pending,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn enqueue(&self, signals: Vec<Signal>) {
        if signals.is_empty() {
            return;
        }
        if self.commands.send(Command::Enqueue(signals)).is_err() {
            tracing::warn!("delivery worker has stopped, dropping signals");
        }
    }

    pub fn cancel(&self, id: SignalId) {
        if self.commands.send(Command::Cancel(id)).is_err() {
            tracing::warn!(%id, "delivery worker has stopped, cannot cancel");
        }
    }

    /// Number of queued signals as of the worker's last pass.
    pub fn pending(&self) -> usize {
        self.pending.load(atomic::Ordering::Acquire)
    }

    /// Stops the worker, releasing any note still sounding.
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if handle.join().is_err() {
            tracing::error!("delivery worker panicked");
        }
    }
}

impl Drop for Out {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Filter for Out {
    fn name(&self) -> &str {
        "Out"
    }

    fn handle(
        &self,
        _ctx: &Context,
        signals: Signals,
        _args: &Arguments,
    ) -> Result<Signals, FilterError> {
        self.enqueue(signals.into_iter().collect());
        Ok(Signals::new())
    }
}

impl SignalEventListener for Out {
    fn deactivated(&self, id: SignalId, _channel: u8, _pitch: Pitch) {
        self.cancel(id);
    }
}

struct Worker {
    queue: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    sounding: HashSet<Sounding>,
    released: HashSet<Sounding>,
    output: Box<dyn Output>,
    clock: Arc<dyn Clock>,
    pending: Arc<AtomicUsize>,
}

impl Worker {
    fn run(mut self, commands: Receiver<Command>, poll_interval: Duration) {
        tracing::debug!(?poll_interval, "delivery worker started");
        loop {
            let now = self.clock.now();
            loop {
                match commands.try_recv() {
                    Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => {
                        return self.finish();
                    }
                    Ok(command) => self.apply(command),
                    Err(TryRecvError::Empty) => break,
                }
            }

            self.deliver_due(now);
            self.pending.store(self.queue.len(), atomic::Ordering::Release);

            match commands.recv_timeout(poll_interval) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    return self.finish();
                }
                Ok(command) => self.apply(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Enqueue(signals) => {
                for signal in signals {
                    tracing::trace!(%signal, "queued");
                    self.push(signal);
                }
            }
            Command::Cancel(id) => self.cancel(id),
            Command::Shutdown => {}
        }
    }

    fn push(&mut self, signal: Signal) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Pending {
            time: signal.time(),
            seq,
            signal,
        }));
    }

    fn cancel(&mut self, id: SignalId) {
        let before = self.queue.len();
        let sounding = &self.sounding;
        let mut releases = Vec::new();
        self.queue.retain(|Reverse(pending)| {
            if pending.signal.id() != id {
                return true;
            }
            if !pending.signal.is_active() && sounding.contains(&sounding_key(&pending.signal)) {
                releases.push(pending.signal.clone());
            }
            false
        });

        let removed = before - self.queue.len();
        if removed > 0 {
            tracing::debug!(
                %id,
                removed,
                released = releases.len(),
                "cancelled pending signals"
            );
        }

        // released offs are queued at `now`, behind anything already due
        let now = self.clock.now();
        for release in releases {
            self.released.insert(sounding_key(&release));
            self.push(release.modified_time(now));
        }
    }

    fn deliver_due(&mut self, now: u64) {
        while self.queue.peek().is_some_and(|Reverse(head)| head.time <= now) {
            if let Some(Reverse(pending)) = self.queue.pop() {
                self.deliver(pending.signal);
            }
        }
    }

    fn deliver(&mut self, signal: Signal) {
        let key = sounding_key(&signal);
        if signal.is_active() {
            self.released.remove(&key);
        } else if !self.sounding.contains(&key) && self.released.remove(&key) {
            tracing::trace!(%signal, "note already released");
            return;
        }

        let output = &mut self.output;
        match panic::catch_unwind(AssertUnwindSafe(|| output.send(&signal))) {
            Ok(Ok(())) => {
                if signal.is_active() {
                    self.sounding.insert(key);
                } else {
                    self.sounding.remove(&key);
                }
            }
            Ok(Err(error)) => tracing::warn!(%signal, %error, "failed to deliver signal"),
            Err(_) => tracing::warn!(%signal, "output panicked while delivering signal"),
        }
    }

    fn finish(mut self) {
        let now = self.clock.now();
        let mut hanging: Vec<Signal> = self
            .queue
            .drain()
            .map(|Reverse(pending)| pending.signal)
            .filter(|s| !s.is_active() && self.sounding.contains(&sounding_key(s)))
            .collect();
        hanging.sort_by_key(Signal::time);

        for release in hanging {
            self.deliver(release.modified_time(now));
        }
        self.pending.store(0, atomic::Ordering::Release);
        tracing::debug!(still_sounding = self.sounding.len(), "delivery worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::io::{ChannelOutput, OutputError};
    use crate::signal::Played;

    const WAIT: Duration = Duration::from_millis(500);
    const QUIET: Duration = Duration::from_millis(30);

    fn note(time: u64, midi: i32) -> Signal {
        Signal::on(time, 0, Played::new(Pitch::from_midi(midi).unwrap(), 100))
    }

    fn setup() -> (Out, Arc<ManualClock>, Receiver<Signal>) {
        let clock = Arc::new(ManualClock::new(0));
        let (tx, rx) = crossbeam::channel::unbounded();
        let out = Out::new(ChannelOutput::new(tx), clock.clone());
        (out, clock, rx)
    }

    fn next_pitch(rx: &Receiver<Signal>) -> u8 {
        rx.recv_timeout(WAIT).unwrap().pitch().midi()
    }

    #[test]
    fn delivers_in_time_order_once_due() {
        let (out, clock, rx) = setup();
        out.enqueue(vec![note(30, 62), note(10, 60), note(20, 61)]);
        assert!(rx.recv_timeout(QUIET).is_err());

        clock.set(15);
        assert_eq!(next_pitch(&rx), 60);
        assert!(rx.recv_timeout(QUIET).is_err());

        clock.set(100);
        assert_eq!(next_pitch(&rx), 61);
        assert_eq!(next_pitch(&rx), 62);
    }

    #[test]
    fn equal_times_keep_arrival_order() {
        let (out, clock, rx) = setup();
        out.enqueue((60..70).map(|p| note(10, p)).collect());
        out.enqueue(vec![note(10, 70)]);
        clock.set(10);

        let delivered: Vec<u8> = (0..11).map(|_| next_pitch(&rx)).collect();
        assert_eq!(delivered, (60..71).collect::<Vec<u8>>());
    }

    #[test]
    fn cancel_removes_only_that_id() {
        let (out, clock, rx) = setup();
        let keep = note(50, 60);
        let cancelled = note(50, 64);
        out.enqueue(vec![cancelled.clone(), keep.clone(), cancelled.to_off().modified_time(80)]);
        out.cancel(cancelled.id());
        clock.set(100);

        assert_eq!(rx.recv_timeout(WAIT).unwrap().id(), keep.id());
        assert!(rx.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn cancelling_a_sounding_note_releases_it_now() {
        let (out, clock, rx) = setup();
        let held = note(0, 60);
        out.enqueue(vec![held.clone(), held.to_off().modified_time(1_000)]);
        assert!(rx.recv_timeout(WAIT).unwrap().is_active());

        clock.set(5);
        out.cancel(held.id());
        let release = rx.recv_timeout(WAIT).unwrap();
        assert!(!release.is_active());
        assert_eq!(release.id(), held.id());
        assert_eq!(release.time(), 5);
    }

    #[test]
    fn release_waits_behind_entries_already_due() {
        let (out, clock, rx) = setup();
        clock.set(90);
        let held = note(0, 60);
        out.enqueue(vec![held.clone(), held.to_off().modified_time(1_000), note(95, 64)]);
        assert_eq!(next_pitch(&rx), 60);

        clock.set(100);
        out.cancel(held.id());
        let times: Vec<u64> = (0..2).map(|_| rx.recv_timeout(WAIT).unwrap().time()).collect();
        assert_eq!(times, vec![95, 100]);
    }

    #[test]
    fn released_note_is_not_turned_off_twice() {
        let (out, clock, rx) = setup();
        let held = note(0, 60);
        out.enqueue(vec![held.clone(), held.to_off().modified_time(1_000)]);
        assert!(rx.recv_timeout(WAIT).unwrap().is_active());

        clock.set(5);
        out.cancel(held.id());
        out.enqueue(vec![held.to_off().modified_time(5)]);
        let release = rx.recv_timeout(WAIT).unwrap();
        assert!(!release.is_active());
        assert!(rx.recv_timeout(QUIET).is_err());

        let again = note(10, 60);
        out.enqueue(vec![again.clone(), again.to_off().modified_time(10)]);
        clock.set(10);
        assert!(rx.recv_timeout(WAIT).unwrap().is_active());
        assert!(!rx.recv_timeout(WAIT).unwrap().is_active());
    }

    struct Counting(Arc<AtomicUsize>);

    impl Output for Counting {
        fn send(&mut self, _signal: &Signal) -> Result<(), OutputError> {
            self.0.fetch_add(1, atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn idle_worker_never_calls_the_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let out = Out::new(Counting(calls.clone()), Arc::new(ManualClock::new(1_000)));
        std::thread::sleep(QUIET);
        assert_eq!(calls.load(atomic::Ordering::SeqCst), 0);
        assert_eq!(out.pending(), 0);
    }

    struct Flaky {
        calls: usize,
        tx: crossbeam::channel::Sender<Signal>,
    }

    impl Output for Flaky {
        fn send(&mut self, signal: &Signal) -> Result<(), OutputError> {
            self.calls += 1;
            match self.calls {
                1 => Err(OutputError::Send("port busy".into())),
                2 => panic!("driver fault"),
                _ => self.tx.send(signal.clone()).map_err(|_| OutputError::Disconnected),
            }
        }
    }

    #[test]
    fn failed_sends_do_not_stop_the_worker() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let clock = Arc::new(ManualClock::new(0));
        let out = Out::new(Flaky { calls: 0, tx }, clock.clone());
        out.enqueue(vec![note(0, 60), note(0, 61), note(0, 62)]);

        assert_eq!(next_pitch(&rx), 62);
        out.enqueue(vec![note(1, 63)]);
        clock.set(1);
        assert_eq!(next_pitch(&rx), 63);
    }

    #[test]
    fn as_a_stage_it_consumes_its_input() {
        let (out, clock, rx) = setup();
        let ctx = Context::new(clock.clone());
        let input = Signals::from(vec![note(20, 60)]);

        let rest = out.handle(&ctx, input, &Arguments::new()).unwrap();
        assert!(rest.is_empty());
        clock.set(20);
        assert_eq!(next_pitch(&rx), 60);
    }

    #[test]
    fn shutdown_releases_sounding_notes() {
        let (out, _clock, rx) = setup();
        let held = note(0, 60);
        out.enqueue(vec![held.clone(), held.to_off().modified_time(1_000), note(2_000, 70)]);
        assert!(rx.recv_timeout(WAIT).unwrap().is_active());

        out.shutdown();
        let delivered: Vec<Signal> = rx.try_iter().collect();
        assert_eq!(delivered.len(), 1);
        assert!(!delivered[0].is_active());
        assert_eq!(delivered[0].id(), held.id());
    }
}
