//! Tests for the Keithley 2000 command layer.

use rstest::*;

use dmmrs::{DmmError, LoopbackTransport};

use keithley_2000::*;

// Type alias for the loopback transport with the Keithley 2000 driver.
type K2000Lbk = Keithley2000<LoopbackTransport>;

/// Function that creates a new Keithley2000 instance with the given input and output
/// commands.
fn crt_inst(host2inst: Vec<&str>, inst2host: Vec<&str>) -> K2000Lbk {
    let term = "\n";
    let h2i: Vec<String> = host2inst.iter().map(|s| s.to_string()).collect();
    let i2h: Vec<String> = inst2host.iter().map(|s| s.to_string()).collect();
    let interface = LoopbackTransport::new(h2i, i2h, term);
    Keithley2000::new(interface)
}

/// The ambient commands `configure` always sends after function setup, for the default
/// config fields (filter off, display on, auto-zero on, immediate trigger).
fn ambient_defaults() -> Vec<&'static str> {
    vec!["AVER:STAT OFF", "DISP:ENAB 1", "SYST:AZER:STAT 1", "TRIG:SOUR IMM"]
}

#[fixture]
fn emp_inst() -> K2000Lbk {
    crt_inst(vec![], vec![])
}

/// Empty initialization should always pass.
#[rstest]
fn test_initialization(_emp_inst: K2000Lbk) {}

/// Get the identification from the instrument.
#[rstest]
fn test_identify() {
    let mut inst = crt_inst(
        vec!["*IDN?"],
        vec!["KEITHLEY INSTRUMENTS INC.,MODEL 2000,1234567,A20"],
    );
    assert_eq!(
        inst.identify().unwrap(),
        "KEITHLEY INSTRUMENTS INC.,MODEL 2000,1234567,A20"
    );
}

/// Configure a DC voltage measurement with auto range and NPLC.
#[rstest]
fn test_configure_dcv_auto_range() {
    let mut expected = vec!["CONF:VOLT:DC", "VOLT:DC:RANG:AUTO ON", "VOLT:DC:NPLC 1"];
    expected.extend(ambient_defaults());
    let mut inst = crt_inst(expected, vec![]);

    let cfg = MeasurementConfig {
        function: MeasFunction::VoltageDc,
        nplc: Some(1.0),
        ..MeasurementConfig::default()
    };
    inst.configure(&cfg).unwrap();
}

/// A fixed range turns auto ranging off first, then sets the full-scale value.
#[rstest]
fn test_configure_fixed_range() {
    let mut expected = vec![
        "CONF:CURR:DC",
        "CURR:DC:RANG:AUTO OFF",
        "CURR:DC:RANG 0.1",
        "CURR:DC:NPLC 10",
    ];
    expected.extend(ambient_defaults());
    let mut inst = crt_inst(expected, vec![]);

    let cfg = MeasurementConfig {
        function: MeasFunction::CurrentDc,
        range: RangeSetting::Fixed(0.1),
        nplc: Some(10.0),
        ..MeasurementConfig::default()
    };
    inst.configure(&cfg).unwrap();
}

/// Functions without NPLC support never get an NPLC command, even when one is supplied.
#[rstest]
#[case(MeasFunction::VoltageAc, "CONF:VOLT:AC", Some("VOLT:AC:RANG:AUTO ON"))]
#[case(MeasFunction::CurrentAc, "CONF:CURR:AC", Some("CURR:AC:RANG:AUTO ON"))]
#[case(MeasFunction::Frequency, "CONF:FREQ", None)]
#[case(MeasFunction::Period, "CONF:PER", None)]
#[case(MeasFunction::Diode, "CONF:DIOD", None)]
#[case(MeasFunction::Continuity, "CONF:CONT", None)]
fn test_configure_withholds_nplc(
    #[case] function: MeasFunction,
    #[case] conf_cmd: &str,
    #[case] range_cmd: Option<&str>,
) {
    let mut expected = vec![conf_cmd];
    expected.extend(range_cmd);
    expected.extend(ambient_defaults());
    let mut inst = crt_inst(expected, vec![]);

    let cfg = MeasurementConfig {
        function,
        nplc: Some(1.0),
        ..MeasurementConfig::default()
    };
    inst.configure(&cfg).unwrap();
}

/// Functions without range support never get range commands, even with a fixed range.
#[rstest]
#[case(MeasFunction::Temperature, "CONF:TEMP", Some("TEMP:NPLC 5"))]
#[case(MeasFunction::Frequency, "CONF:FREQ", None)]
fn test_configure_withholds_range(
    #[case] function: MeasFunction,
    #[case] conf_cmd: &str,
    #[case] nplc_cmd: Option<&str>,
) {
    let mut expected = vec![conf_cmd];
    expected.extend(nplc_cmd);
    expected.extend(ambient_defaults());
    let mut inst = crt_inst(expected, vec![]);

    let cfg = MeasurementConfig {
        function,
        range: RangeSetting::Fixed(100.0),
        nplc: Some(5.0),
        ..MeasurementConfig::default()
    };
    inst.configure(&cfg).unwrap();
}

/// An out-of-bounds NPLC is rejected before anything is sent.
#[rstest]
fn test_configure_invalid_nplc(mut emp_inst: K2000Lbk) {
    let cfg = MeasurementConfig {
        nplc: Some(50.0),
        ..MeasurementConfig::default()
    };
    assert!(matches!(emp_inst.configure(&cfg), Err(DmmError::Config(_))));
}

/// An out-of-bounds filter window is rejected before anything is sent.
#[rstest]
fn test_configure_invalid_filter_window(mut emp_inst: K2000Lbk) {
    let cfg = MeasurementConfig {
        filter: FilterConfig {
            enabled: true,
            window: 1,
            mode: FilterMode::Moving,
        },
        ..MeasurementConfig::default()
    };
    assert!(matches!(emp_inst.configure(&cfg), Err(DmmError::Config(_))));
}

/// Enabling the filter sets mode and window before arming it.
#[rstest]
fn test_set_filter_enable_order() {
    let mut inst = crt_inst(vec!["AVER:TCON REP", "AVER:COUN 25", "AVER:STAT ON"], vec![]);
    inst.set_filter(&FilterConfig {
        enabled: true,
        window: 25,
        mode: FilterMode::Repeating,
    })
    .unwrap();
}

/// Disabling the filter is a single command.
#[rstest]
fn test_set_filter_disable() {
    let mut inst = crt_inst(vec!["AVER:STAT OFF"], vec![]);
    inst.set_filter(&FilterConfig::default()).unwrap();
}

#[rstest]
#[case(true, "DISP:ENAB 1")]
#[case(false, "DISP:ENAB 0")]
fn test_set_display(#[case] enabled: bool, #[case] cmd: &str) {
    let mut inst = crt_inst(vec![cmd], vec![]);
    inst.set_display(enabled).unwrap();
}

#[rstest]
#[case(true, "SYST:AZER:STAT 1")]
#[case(false, "SYST:AZER:STAT 0")]
fn test_set_autozero(#[case] enabled: bool, #[case] cmd: &str) {
    let mut inst = crt_inst(vec![cmd], vec![]);
    inst.set_autozero(enabled).unwrap();
}

#[rstest]
#[case(TriggerSource::Immediate, "TRIG:SOUR IMM")]
#[case(TriggerSource::Bus, "TRIG:SOUR BUS")]
#[case(TriggerSource::External, "TRIG:SOUR EXT")]
#[case(TriggerSource::Timer, "TRIG:SOUR TIM")]
fn test_set_trigger_source(#[case] source: TriggerSource, #[case] cmd: &str) {
    let mut inst = crt_inst(vec![cmd], vec![]);
    inst.set_trigger_source(source).unwrap();
}

/// Standalone NPLC setting for a capable function.
#[rstest]
fn test_set_nplc() {
    let mut inst = crt_inst(vec!["FRES:NPLC 0.1"], vec![]);
    inst.set_nplc(MeasFunction::Resistance4W, 0.1).unwrap();
}

/// Standalone NPLC setting for a non-capable function is silently withheld.
#[rstest]
fn test_set_nplc_unsupported_is_silent(mut emp_inst: K2000Lbk) {
    emp_inst.set_nplc(MeasFunction::VoltageAc, 1.0).unwrap();
}

/// Standalone NPLC setting checks the instrument's bounds.
#[rstest]
fn test_set_nplc_out_of_bounds(mut emp_inst: K2000Lbk) {
    assert!(matches!(
        emp_inst.set_nplc(MeasFunction::VoltageDc, 0.001),
        Err(DmmError::Config(_))
    ));
}

/// A single measurement is triggered and fetched with `READ?`.
#[rstest]
fn test_measure_single() {
    let mut inst = crt_inst(vec!["READ?"], vec!["+1.234560E+00"]);
    assert_eq!(inst.measure_single().unwrap(), 1.23456);
}

/// Fast mode combines trigger and fetch into a single transaction.
#[rstest]
fn test_measure_fast() {
    let mut inst = crt_inst(vec!["INIT;:FETC?"], vec!["-4.200000E-03"]);
    assert_eq!(inst.measure_fast().unwrap(), -0.0042);
}

/// A non-numeric reply is a parse error, not a zero reading.
#[rstest]
fn test_measure_garbage_reply() {
    let mut inst = crt_inst(vec!["READ?"], vec!["HUH?"]);
    assert!(matches!(
        inst.measure_single(),
        Err(DmmError::ResponseParse(_))
    ));
}

/// Separate initiate and fetch.
#[rstest]
fn test_initiate_and_fetch() {
    let mut inst = crt_inst(vec!["INIT", "FETC?"], vec!["+9.999000E-01"]);
    inst.initiate().unwrap();
    assert_eq!(inst.fetch().unwrap(), 0.9999);
}

/// Typed convenience reading.
#[rstest]
fn test_measure_voltage() {
    let mut inst = crt_inst(vec!["READ?"], vec!["+2.500000E+00"]);
    let volts = inst.measure_voltage().unwrap();
    assert_eq!(volts.as_volts(), 2.5);
}

/// A pending device error is surfaced with its code and message.
#[rstest]
fn test_check_error_reports_device_fault() {
    let mut inst = crt_inst(vec!["SYST:ERR?"], vec!["-113,\"Undefined header\""]);
    match inst.check_error() {
        Err(DmmError::Device { code, message }) => {
            assert_eq!(code, -113);
            assert_eq!(message, "Undefined header");
        }
        other => panic!("Expected Device error, got {other:?}"),
    }
}

/// An empty error queue passes the check.
#[rstest]
fn test_check_error_no_error() {
    let mut inst = crt_inst(vec!["SYST:ERR?"], vec!["0,\"No error\""]);
    inst.check_error().unwrap();
}

#[rstest]
fn test_clear_status_and_beep() {
    let mut inst = crt_inst(vec!["*CLS", "SYST:BEEP 1000,0.1"], vec![]);
    inst.clear_status().unwrap();
    inst.beep(1000, 0.1).unwrap();
}

/// Handing the meter back to the front panel keeps the connection open.
#[rstest]
fn test_set_local() {
    let mut inst = crt_inst(vec!["SYST:LOC"], vec![]);
    inst.set_local().unwrap();
    assert!(inst.is_connected());
}

#[rstest]
fn test_reset() {
    let mut inst = crt_inst(vec!["*RST"], vec![]);
    inst.reset().unwrap();
}

/// Clearing the trace buffer on its own.
#[rstest]
fn test_buffer_clear() {
    let mut inst = crt_inst(vec!["TRAC:CLE"], vec![]);
    inst.buffer_clear().unwrap();
}

/// The trace buffer is configured in the stop-feed, clear, size, source, arm order.
#[rstest]
fn test_buffer_configure_sequence() {
    let mut inst = crt_inst(
        vec![
            "TRAC:FEED:CONT NEV",
            "TRAC:CLE",
            "TRAC:POIN 50",
            "TRAC:FEED SENS1",
            "TRAC:FEED:CONT NEXT",
        ],
        vec![],
    );
    inst.buffer_configure(50).unwrap();
}

/// The requested point count is capped at the hardware buffer size.
#[rstest]
fn test_buffer_configure_caps_points() {
    let mut inst = crt_inst(
        vec![
            "TRAC:FEED:CONT NEV",
            "TRAC:CLE",
            "TRAC:POIN 1024",
            "TRAC:FEED SENS1",
            "TRAC:FEED:CONT NEXT",
        ],
        vec![],
    );
    inst.buffer_configure(5000).unwrap();
}

/// Starting a burst enables the buffer-full status bit, sets the trigger count, selects
/// immediate triggering, and initiates.
#[rstest]
fn test_buffer_start_sequence() {
    let mut inst = crt_inst(
        vec!["STAT:MEAS:ENAB 512", "TRIG:COUN 50", "TRIG:SOUR IMM", "INIT"],
        vec![],
    );
    inst.buffer_start(50).unwrap();
}

/// The fill count query tolerates a float-formatted reply.
#[rstest]
fn test_buffer_count_float_reply() {
    let mut inst = crt_inst(vec!["TRAC:POIN:ACT?"], vec!["12.0"]);
    assert_eq!(inst.buffer_count().unwrap(), 12);
}

/// Completion via the status byte, without falling back to the count.
#[rstest]
fn test_buffer_complete_by_status_flag() {
    let mut inst = crt_inst(vec!["*STB?"], vec!["1"]);
    assert!(inst.buffer_is_complete(50).unwrap());
}

/// Completion via the fill count when the status flag is not set.
#[rstest]
fn test_buffer_complete_by_count() {
    let mut inst = crt_inst(vec!["*STB?", "TRAC:POIN:ACT?"], vec!["0", "50"]);
    assert!(inst.buffer_is_complete(50).unwrap());
}

/// Neither signal present: the capture is still running.
#[rstest]
fn test_buffer_not_complete() {
    let mut inst = crt_inst(vec!["*STB?", "TRAC:POIN:ACT?"], vec!["0", "17"]);
    assert!(!inst.buffer_is_complete(50).unwrap());
}

/// Reading the buffer aborts the capture first and parses the bulk reply.
#[rstest]
fn test_buffer_read() {
    let mut inst = crt_inst(
        vec!["ABOR", "TRAC:DATA?"],
        vec!["+1.000000E+00,+2.000000E+00,+3.000000E+00"],
    );
    assert_eq!(inst.buffer_read().unwrap(), vec![1.0, 2.0, 3.0]);
}

/// An empty bulk reply yields no values rather than an error.
#[rstest]
fn test_buffer_read_empty() {
    let mut inst = crt_inst(vec!["ABOR", "TRAC:DATA?"], vec![""]);
    assert_eq!(inst.buffer_read().unwrap(), Vec::<f64>::new());
}

/// A corrupt value in the bulk reply is a parse error.
#[rstest]
fn test_buffer_read_garbage() {
    let mut inst = crt_inst(vec!["ABOR", "TRAC:DATA?"], vec!["1.0,oops,3.0"]);
    assert!(matches!(
        inst.buffer_read(),
        Err(DmmError::ResponseParse(_))
    ));
}

/// After a disconnect every operation fails fast.
#[rstest]
fn test_disconnect() {
    let mut inst = crt_inst(vec!["SYST:LOC"], vec![]);
    assert!(inst.is_connected());
    inst.disconnect();
    assert!(!inst.is_connected());
    assert!(matches!(
        inst.measure_single(),
        Err(DmmError::NotConnected)
    ));
}

/// Clones share the connection; a disconnect through one invalidates the other.
#[rstest]
fn test_clone_shares_connection() {
    let mut inst = crt_inst(vec!["SYST:LOC"], vec![]);
    let mut clone = inst.clone();
    inst.disconnect();
    assert!(!clone.is_connected());
    assert!(matches!(clone.identify(), Err(DmmError::NotConnected)));
}

/// Capability table: range and NPLC support per function.
#[rstest]
#[case(MeasFunction::VoltageDc, true, true)]
#[case(MeasFunction::VoltageAc, true, false)]
#[case(MeasFunction::CurrentDc, true, true)]
#[case(MeasFunction::CurrentAc, true, false)]
#[case(MeasFunction::Resistance2W, true, true)]
#[case(MeasFunction::Resistance4W, true, true)]
#[case(MeasFunction::Frequency, false, false)]
#[case(MeasFunction::Period, false, false)]
#[case(MeasFunction::Temperature, false, true)]
#[case(MeasFunction::Diode, false, false)]
#[case(MeasFunction::Continuity, false, false)]
fn test_function_capabilities(
    #[case] function: MeasFunction,
    #[case] range: bool,
    #[case] nplc: bool,
) {
    assert_eq!(function.capabilities(), FunctionCaps { range, nplc });
}

/// Display units used for export labelling.
#[rstest]
#[case(MeasFunction::VoltageDc, "V")]
#[case(MeasFunction::CurrentAc, "A")]
#[case(MeasFunction::Resistance4W, "Ω")]
#[case(MeasFunction::Frequency, "Hz")]
#[case(MeasFunction::Period, "s")]
#[case(MeasFunction::Temperature, "°C")]
fn test_function_units(#[case] function: MeasFunction, #[case] unit: &str) {
    assert_eq!(function.unit(), unit);
}
