//! # EvOS Example Firmware
//!
//! Demonstrates the event-driven scheduler with three tasks and an idle
//! task that sleeps whenever nothing is queued:
//!
//! | Task       | Wakes on                            | Behavior                                  |
//! |------------|-------------------------------------|-------------------------------------------|
//! | `blinker`  | START, `BLINK`, POLL                | Toggles the LED state every 500 ticks     |
//! | `sampler`  | START, `SAMPLE`, `CONVERTED`, POLL  | Starts a conversion every 100 ticks and   |
//! |            |                                     | holds off deep sleep while it runs        |
//! | `reporter` | `REPORT` from the sampler           | Counts finished conversions               |
//! | idle       | empty queue                         | `wait_for_events()` in the deepest        |
//! |            |                                     | allowed sleep mode                        |
//!
//! A task whose timer cannot be armed because the timer list is full keeps
//! it pending and retries on a `POLL` it sends itself.
//!
//! ## Expected Behavior
//!
//! 1. All START events are dispatched in registration order.
//! 2. Between timer expiries the idle task keeps the core in deep sleep,
//!    except during the 2-tick conversion window where the sampler has
//!    requested `SleepMode::LIGHT`.
//! 3. The SysTick interrupt only advances the clock; expired timers are
//!    promoted to the event queue by the foreground loop.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use evos::arch::cortex_m4;
use evos::{
    Context, EventCode, EventData, Flow, Handler, Kernel, Pid, Shared, SleepMode, Ticks, POLL, START,
};

/// Queues, timers and clock, reachable from the SysTick handler.
static SHARED: Shared = Shared::new();

/// Label attached to every `REPORT` event.
static ADC_CHANNEL: &str = "adc0";

// Application event codes (below the reserved range).
const BLINK: EventCode = 1;
const SAMPLE: EventCode = 2;
const CONVERTED: EventCode = 3;
const REPORT: EventCode = 4;

const BLINK_PERIOD: Ticks = 500;
const SAMPLE_PERIOD: Ticks = 100;
const CONVERSION_TIME: Ticks = 2;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Arm the `pending` timer for the running task.
///
/// On failure the timer stays pending and the task queues itself a `POLL`,
/// so the next dispatch tries again. The task only stalls if the event
/// queue is full as well.
fn arm(cx: &Context<'_>, pending: Option<(EventCode, Ticks)>) -> Option<(EventCode, Ticks)> {
    let (code, timeout) = pending?;
    match cx.add_timer_event(timeout, cx.pid(), code, None) {
        Ok(()) => None,
        Err(_) => {
            let _ = cx.send_event(cx.pid(), POLL, None);
            pending
        }
    }
}

/// Toggles the LED on a 500-tick timer it re-arms on every expiry.
struct Blinker {
    led_on: bool,
    toggles: u32,
    pending: Option<(EventCode, Ticks)>,
}

impl Handler for Blinker {
    fn handle(&mut self, cx: &Context<'_>, code: EventCode, _data: EventData) -> Flow {
        match code {
            START => self.pending = Some((BLINK, BLINK_PERIOD)),
            BLINK => {
                self.led_on = !self.led_on;
                self.toggles = self.toggles.wrapping_add(1);
                self.pending = Some((BLINK, BLINK_PERIOD));
            }
            _ => {}
        }
        self.pending = arm(cx, self.pending);
        Flow::Continue
    }
}

/// Periodic sampler. The conversion needs the peripheral clocks, so deep
/// sleep is vetoed from `SAMPLE` until `CONVERTED`.
struct Sampler {
    reporter: Pid,
    converting: bool,
    pending: Option<(EventCode, Ticks)>,
}

impl Handler for Sampler {
    fn handle(&mut self, cx: &Context<'_>, code: EventCode, _data: EventData) -> Flow {
        match code {
            START => self.pending = Some((SAMPLE, SAMPLE_PERIOD)),
            SAMPLE if !self.converting => {
                cx.request_mode(SleepMode::LIGHT);
                self.converting = true;
                self.pending = Some((CONVERTED, CONVERSION_TIME));
            }
            CONVERTED if self.converting => {
                cx.release_mode(SleepMode::LIGHT);
                self.converting = false;
                // A lost report only skews the count.
                let _ = cx.send_event(self.reporter, REPORT, Some(&ADC_CHANNEL));
                self.pending = Some((SAMPLE, SAMPLE_PERIOD));
            }
            _ => {}
        }
        self.pending = arm(cx, self.pending);
        Flow::Continue
    }
}

/// Counts finished conversions per channel label.
struct Reporter {
    reports: u32,
}

impl Handler for Reporter {
    fn handle(&mut self, _cx: &Context<'_>, code: EventCode, data: EventData) -> Flow {
        let from_adc = data
            .and_then(|data| data.downcast_ref::<&str>())
            .is_some_and(|channel| *channel == ADC_CHANNEL);
        if code == REPORT && from_adc {
            self.reports = self.reports.wrapping_add(1);
        }
        Flow::Continue
    }
}

/// Sleeps until something is queued. Never finishes.
struct Idle;

impl Handler for Idle {
    fn handle(&mut self, cx: &Context<'_>, _code: EventCode, _data: EventData) -> Flow {
        cx.wait_for_events();
        Flow::Continue
    }
}

// ---------------------------------------------------------------------------
// Interrupts
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    SHARED.tick();
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Registers the tasks, starts the tick and runs the
/// dispatch loop. Does not return.
#[entry]
fn main() -> ! {
    // Take ownership of core peripherals
    let mut cp = cortex_m::Peripherals::take().expect("core peripherals already taken");

    let mut idle = Idle;
    let mut blinker = Blinker {
        led_on: false,
        toggles: 0,
        pending: None,
    };
    let mut reporter = Reporter { reports: 0 };

    let mut kernel = Kernel::new(&SHARED);
    kernel.add_idle_task(&mut idle, "idle");

    let blinker_pid = kernel
        .add_task(&mut blinker, "blinker")
        .expect("Failed to add blinker");
    let reporter_pid = kernel
        .add_task(&mut reporter, "reporter")
        .expect("Failed to add reporter");

    // The sampler needs the reporter's pid, so it is built after it.
    let mut sampler = Sampler {
        reporter: reporter_pid,
        converting: false,
        pending: None,
    };
    let sampler_pid = kernel
        .add_task(&mut sampler, "sampler")
        .expect("Failed to add sampler");

    for pid in [blinker_pid, reporter_pid, sampler_pid] {
        kernel.start_task(pid).expect("Failed to start task");
    }

    cortex_m4::configure_systick(&mut cp.SYST);

    // The idle task never finishes, so this does not return.
    kernel.run();

    loop {
        cortex_m::asm::wfi();
    }
}
