use std::{thread, time::Duration};

use keithley_2000::{
    AcquisitionController, AcquisitionMode, ContinuousSettings, Keithley2000, MeasFunction,
    MeasurementConfig, RunState,
    discovery::{self, CandidateOpener, SerialOpener},
};

fn main() {
    env_logger::init();

    // Scan the bus for a meter; the first entry is the simplest address of a verified
    // Keithley 2000.
    let opener = SerialOpener::default();
    let found = discovery::list_candidates(&opener, true, Duration::from_secs(1), true).unwrap();
    let meter = found.first().expect("No Keithley 2000 found on the bus");
    println!("Using {meter}");

    let interface = opener
        .open(&meter.address, Duration::from_secs(3))
        .expect("Failed to open the meter");
    let inst = Keithley2000::new(interface);

    // Acquire DC voltage for ten seconds, one reading every 100 ms, with the meter's
    // display off for a little extra speed.
    let mut controller = AcquisitionController::new(inst);
    controller
        .configure(MeasurementConfig {
            function: MeasFunction::VoltageDc,
            nplc: Some(1.0),
            display_enabled: false,
            ..MeasurementConfig::default()
        })
        .unwrap();
    controller
        .start(AcquisitionMode::Continuous(ContinuousSettings {
            interval: Duration::from_millis(100),
            duration_limit: Some(Duration::from_secs(10)),
            fast_mode: true,
        }))
        .unwrap();

    // Poll the store at our own cadence while the worker samples at its own.
    while controller.status().state != RunState::Idle {
        let status = controller.status();
        println!("{:?}: {} samples", status.state, status.samples);
        thread::sleep(Duration::from_millis(500));
    }

    if let Some(error) = controller.status().error {
        eprintln!("Run ended with an error: {error}");
    }

    let unit = controller.active_config().function.unit();
    let samples = controller.snapshot();
    println!("Acquired {} samples:", samples.len());
    for sample in samples.iter().take(10) {
        println!("  {:8.3} s  {} {}", sample.elapsed, sample.value, unit);
    }
}
