//! Sensor polling demo: a worker thread owns a simulated joystick and an LED,
//! and the main thread reads the stick through deferred calls.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use itc_mailbox::{defer_call, TaskMailbox, Timeout};
use itc_runtime_native::{spawn_worker, WorkerConfig};
use log::info;

const MAILBOX_SLOTS: usize = 8;

/// Simulated peripherals. Only the sensor worker touches the joystick.
mod sensor {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Full-scale reading after converting the 0..1 analog value.
    pub const FULL_SCALE: f32 = 1000.0;

    /// Two-axis analog stick producing a slow deterministic sweep.
    #[derive(Debug, Default)]
    pub struct Joystick {
        tick: u32,
    }

    impl Joystick {
        /// Samples both axes, scaled to `0..=1000`.
        pub fn read(&mut self) -> (i32, i32) {
            self.tick = self.tick.wrapping_add(1);
            let phase = self.tick as f32;
            let x = 0.5 + 0.5 * (phase * 0.3).sin();
            let y = 0.5 + 0.5 * (phase * 0.2).cos();
            (scale(x), scale(y))
        }
    }

    fn scale(analog: f32) -> i32 {
        (analog.clamp(0.0, 1.0) * FULL_SCALE) as i32
    }

    /// Status LED, toggled from the worker via posted method tasks.
    #[derive(Debug)]
    pub struct Led {
        lit: AtomicBool,
        toggles: AtomicU32,
    }

    impl Led {
        pub const fn new() -> Self {
            Self {
                lit: AtomicBool::new(false),
                toggles: AtomicU32::new(0),
            }
        }

        pub fn toggle(&self) {
            self.lit.fetch_xor(true, Ordering::Relaxed);
            self.toggles.fetch_add(1, Ordering::Relaxed);
        }

        pub fn is_lit(&self) -> bool {
            self.lit.load(Ordering::Relaxed)
        }

        pub fn toggles(&self) -> u32 {
            self.toggles.load(Ordering::Relaxed)
        }
    }

}

thread_local! {
    static JOYSTICK: RefCell<Option<sensor::Joystick>> = const { RefCell::new(None) };
}

static LED: sensor::Led = sensor::Led::new();

/// Poll a worker-owned joystick from the main thread.
#[derive(Parser, Debug)]
#[command(author, version, about = "Read a worker-owned sensor through deferred calls", long_about = None)]
struct Cli {
    /// Number of readings to take before exiting.
    #[arg(short, long, default_value_t = 10)]
    samples: u32,

    /// Delay between readings, in milliseconds.
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,

    /// How long a post may wait for a free mailbox slot, in milliseconds.
    #[arg(long, default_value_t = 100)]
    post_timeout_ms: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let worker = spawn_worker(
        WorkerConfig::named("sensor"),
        Arc::new(TaskMailbox::<MAILBOX_SLOTS>::new()),
    )
    .context("failed to start sensor worker")?;
    let mailbox = Arc::clone(worker.mailbox());

    defer_call(&*mailbox, || {
        JOYSTICK.with(|stick| *stick.borrow_mut() = Some(sensor::Joystick::default()))
    })
    .into_result()
    .context("failed to attach joystick")?;
    info!("joystick attached to worker '{}'", worker.name());

    let interval = Duration::from_millis(cli.interval_ms);
    let post_timeout = Timeout::millis(cli.post_timeout_ms);
    for _ in 0..cli.samples {
        thread::sleep(interval);
        let (x, y) = defer_call(&*mailbox, read_joystick)
            .into_result()
            .context("failed to read joystick")?
            .context("joystick is not attached")?;
        println!("X={x:3}, Y={y:3}");

        mailbox
            .post_method(&LED, sensor::Led::toggle, post_timeout)
            .context("failed to toggle LED")?;
    }

    worker.shutdown().context("sensor worker failed")?;
    let metrics = mailbox.metrics();
    info!(
        "done: {} task(s) executed, LED toggled {} time(s), lit={}",
        metrics.executed,
        LED.toggles(),
        LED.is_lit()
    );
    Ok(())
}

fn read_joystick() -> Option<(i32, i32)> {
    JOYSTICK.with(|stick| stick.borrow_mut().as_mut().map(sensor::Joystick::read))
}
