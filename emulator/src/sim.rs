//! Simulated hardware and virtual time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use sleep_core::clock::{MonotonicClock, WallClock};
use sleep_core::haptic::MotorDriver;
use sleep_core::heartrate::{
    COMMAND_QUEUE_CAPACITY, Command, CommandEnqueueError, CommandQueueProducer, Sample,
    SensorDriver,
};
use sleep_core::persist::{PersistenceError, RecordKind, RecordStore};
use time::PrimitiveDateTime;

/// Virtual clock shared by every simulated component. Serves as both the
/// wall clock and the monotonic clock; it never jumps backwards.
#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<PrimitiveDateTime>>,
}

impl SimClock {
    pub fn new(start: PrimitiveDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Moves the clock to `at`. Earlier instants are ignored.
    pub fn set(&self, at: PrimitiveDateTime) {
        if at > self.now.get() {
            self.now.set(at);
        }
    }

    pub fn get(&self) -> PrimitiveDateTime {
        self.now.get()
    }
}

impl WallClock for SimClock {
    fn now(&self) -> PrimitiveDateTime {
        self.now.get()
    }
}

impl MonotonicClock for SimClock {
    type Instant = PrimitiveDateTime;

    fn now(&self) -> PrimitiveDateTime {
        self.now.get()
    }
}

/// What the optical sensor would see on the wrist.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Wrist {
    pub touching: bool,
    pub bpm: u16,
}

impl Default for Wrist {
    fn default() -> Self {
        Self {
            touching: true,
            bpm: 62,
        }
    }
}

const PULSE_HIGH: u32 = 10_500;
const PULSE_LOW: u32 = 9_500;
const SKIN_AMBIENT: u32 = 120;
const OPEN_AIR_AMBIENT: u32 = 9_000;

/// HRS3300 stand-in producing a square-wave pulse at the wrist's rate.
pub struct SimulatedSensor {
    clock: SimClock,
    wrist: Rc<Cell<Wrist>>,
    enabled: bool,
    origin: PrimitiveDateTime,
}

impl SimulatedSensor {
    pub fn new(clock: SimClock, wrist: Rc<Cell<Wrist>>) -> Self {
        let origin = clock.get();
        Self {
            clock,
            wrist,
            enabled: false,
            origin,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl SensorDriver for SimulatedSensor {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn read_sample(&mut self) -> Sample {
        if !self.enabled {
            return Sample::default();
        }
        let wrist = self.wrist.get();
        if !wrist.touching || wrist.bpm == 0 {
            return Sample::new(PULSE_LOW, OPEN_AIR_AMBIENT);
        }

        let period_ms = 60_000 / u64::from(wrist.bpm);
        let elapsed = self.clock.get() - self.origin;
        let elapsed_ms = u64::try_from(elapsed.whole_milliseconds()).unwrap_or(0);
        let ir = if elapsed_ms % period_ms < period_ms / 2 {
            PULSE_HIGH
        } else {
            PULSE_LOW
        };
        Sample::new(ir, SKIN_AMBIENT)
    }
}

/// Motor that remembers what it was asked to do.
#[derive(Default)]
pub struct SimMotor {
    pulses: u64,
    last: Option<(u8, Duration)>,
    stops: u64,
}

impl SimMotor {
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    pub fn last(&self) -> Option<(u8, Duration)> {
        self.last
    }

    pub fn stops(&self) -> u64 {
        self.stops
    }
}

impl MotorDriver for SimMotor {
    fn run(&mut self, strength: u8, duration: Duration) {
        self.pulses += 1;
        self.last = Some((strength, duration));
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.last = None;
    }
}

/// Heap-backed queue bounded to the worker's capacity. Clones share the
/// same storage so one copy can produce while the session drains the other.
#[derive(Clone)]
pub struct HostQueue {
    capacity: usize,
    commands: Rc<RefCell<VecDeque<Command>>>,
}

impl HostQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            commands: Rc::new(RefCell::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn pop_front(&self) -> Option<Command> {
        self.commands.borrow_mut().pop_front()
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new(COMMAND_QUEUE_CAPACITY)
    }
}

impl CommandQueueProducer for HostQueue {
    type Error = ();

    fn try_enqueue(&mut self, command: Command) -> Result<(), CommandEnqueueError<Self::Error>> {
        let mut commands = self.commands.borrow_mut();
        if commands.len() >= self.capacity {
            return Err(CommandEnqueueError::QueueFull);
        }
        commands.push_back(command);
        Ok(())
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn len(&self) -> Option<usize> {
        Some(self.commands.borrow().len())
    }
}

/// One file per record under a directory, named by the record key.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.key())
    }
}

impl RecordStore for FileStore {
    fn read(&mut self, kind: RecordKind, buf: &mut [u8]) -> Result<usize, PersistenceError> {
        let bytes = match fs::read(self.path(kind)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound);
            }
            Err(_) => return Err(PersistenceError::Storage),
        };
        let target = buf
            .get_mut(..bytes.len())
            .ok_or(PersistenceError::BufferTooSmall)?;
        target.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn write(&mut self, kind: RecordKind, bytes: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)
            .and_then(|()| fs::write(self.path(kind), bytes))
            .map_err(|_| PersistenceError::Storage)
    }
}
