//! Host walk-through of the capture path: take a fault on a simulated
//! processor, persist it into a simulated flash device, then inspect the
//! result with the same operator commands the console exposes.
//!
//! Run with: cargo run --example host_capture

use crashguard_core::capture::{build_snapshot, frame_from_stack, persist, CaptureConfig, CaptureController};
use crashguard_core::cmd;
use crashguard_core::nvm::device::NvmGeometry;
use crashguard_core::nvm::memory::MemNvm;
use crashguard_core::nvm::NvmDriver;
use crashguard_core::processor::{MockProcessor, Processor, ResetCause};
use crashguard_core::record::FaultKind;
use crashguard_core::time::{TimeSource, Uptime};
use crashguard_core::trace::{self, split_u16};
use crashguard_core::wdg::boot::{start_for_init, BootState};
use crashguard_core::wdg::{MockWatchdog, Supervisor, SystemSupervisor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let geometry = NvmGeometry {
        base: 0,
        page_size: 2048,
        pages: 2,
        banks: 1,
        write_bytes: 8,
    };
    let mut driver = NvmDriver::new(MemNvm::<4096>::new(geometry));
    let clock = Uptime::new();

    // Boot: latch the reset cause, paint the stack, arm the guard.
    let mut controller = CaptureController::new(MockProcessor::new(), CaptureConfig::new(0));
    controller.processor_mut().set_reset_cause(ResetCause {
        raw: 1 << 27,
        power_on: true,
        ..ResetCause::default()
    });
    let cause = controller.start();
    println!("boot: reset cause {}", cause);

    // Arm the hardware watchdog for init, register a software client.
    let mut boot_state = BootState::new();
    let mut hardware = MockWatchdog::new();
    let armed = start_for_init(&mut boot_state, &cause, &mut hardware)?;
    println!("boot: hardware watchdog armed: {}", armed);

    let mut supervisor: SystemSupervisor = Supervisor::new();
    supervisor.register(0, 100, clock.now())?;
    supervisor.feed(0, clock.now())?;
    supervisor.check(clock.now(), &mut hardware);

    // Some application activity lands in the trace.
    trace::record(0x10, &[]);
    trace::record(0x11, &split_u16(0x0102));

    // A software-detected fault: capture and persist, as the panic path
    // would (minus the reset, since this host process wants to go on).
    let sp = controller.processor().current_sp();
    let frame = frame_from_stack(controller.processor(), sp);
    let snapshot = build_snapshot(
        FaultKind::Software,
        0x42,
        frame,
        sp,
        0xFFFF_FFFD,
        &controller.processor().fault_registers(),
        clock.now(),
    );
    let outcome = trace::with_image(|image| persist(&mut driver, 0, &snapshot, image))?;
    println!("persist: {:?}", outcome);
    println!();

    // What an operator at the console would see.
    let mut out = String::new();
    cmd::crash_data(&[], &mut driver, 0, &mut out)?;
    print!("{}", out);
    println!();

    out.clear();
    cmd::crash_status(&controller.stack_status(), &controller.reset_cause(), &mut out)?;
    print!("{}", out);
    println!();

    out.clear();
    cmd::watchdog_status(&supervisor, &boot_state, clock.now(), &mut out)?;
    print!("{}", out);

    Ok(())
}
