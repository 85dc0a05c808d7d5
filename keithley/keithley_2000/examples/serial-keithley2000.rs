use keithley_2000::{
    FilterConfig, FilterMode, Keithley2000, MeasFunction, MeasurementConfig, RangeSetting,
    SerialInterfaceKeithley2000,
};

fn main() {
    let port = "/dev/ttyUSB0";

    // Define the serial interface using the `simple` method.
    let interface = SerialInterfaceKeithley2000::simple(port).expect("Failed to open serial port");

    // Now we can open the Keithley 2000 with the serial interface.
    let mut inst = Keithley2000::new(interface);

    // Query and print the identification of the instrument
    println!("Instrument: {}", inst.identify().unwrap());

    // Configure a DC voltage measurement on the 10 V range with one power line cycle of
    // integration and a 10 point moving average filter.
    inst.configure(&MeasurementConfig {
        function: MeasFunction::VoltageDc,
        range: RangeSetting::Fixed(10.0),
        nplc: Some(1.0),
        filter: FilterConfig {
            enabled: true,
            window: 10,
            mode: FilterMode::Moving,
        },
        ..MeasurementConfig::default()
    })
    .unwrap();

    // Take a few readings
    for _ in 0..5 {
        let volts = inst.measure_voltage().unwrap();
        println!("Reading: {} V", volts.as_volts());
    }

    // Check the error queue, beep, and hand the meter back to the front panel.
    if let Err(e) = inst.check_error() {
        eprintln!("Meter reported: {e}");
    }
    inst.beep(1000, 0.1).unwrap();
    inst.disconnect();
}
