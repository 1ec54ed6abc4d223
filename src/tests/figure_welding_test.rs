use crate::config::ScannerConfig;
use crate::error::Error;
use crate::figure::{Figure, Order, PowerPort};
use crate::figure_welding::{
    resolve_special_values, translate_special_value, AbstractFigureWelding, FigureWeldingBase,
    ListState, ScannerControl, WeldingData, WeldingMode, WobbleError, WobbleMode, WobbleResult,
};
use crate::meta_language::ContourCommand;
use crate::rtc6::driver::{RecordingDriver, Rtc6Call};
use crate::rtc6::figure_welding::FigureWelding;

fn weld_figure(points: usize) -> Figure {
    Figure::new((0..points).map(|k| Order::new(k as f64, 0.0, 0.5, 0.0, -1.0)).collect())
}

/// Closed wobble figure with the given port 1 power offsets
fn wobble_figure(powers: &[f64]) -> Figure {
    let corners = [(0.0, 0.0), (0.1, 0.0), (0.1, 0.1), (0.0, 0.0)];
    Figure::new(
        corners
            .iter()
            .zip(powers)
            .map(|(&(x, y), &p)| Order::new(x, y, p, 0.0, -1.0))
            .collect(),
    )
}

fn free_wobble(laser_power: f64, mode: WeldingMode) -> WeldingData {
    WeldingData {
        seam: 7,
        mode,
        wobble_mode: WobbleMode::Free,
        laser_power,
        velocity: 100.0,
        ..WeldingData::default()
    }
}

#[test]
fn zero_nominal_power_rejected_when_welding() {
    let powers = [0.0, 0.15, -0.75, 0.6];
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&free_wobble(0.0, WeldingMode::Welding), weld_figure(3));
    base.set_wobble_figure(Some(wobble_figure(&powers)));
    assert_eq!(base.define_wobble_figure(WobbleMode::Free), Err(WobbleError::NominalPowerWrong));
    assert!(base.resolve_wobble().unwrap_err().is_fatal());

    base.prepare(&free_wobble(0.0, WeldingMode::ScanlabPreview), weld_figure(3));
    assert_eq!(
        base.define_wobble_figure(WobbleMode::Free),
        Ok(WobbleResult::OnePortWobbling(PowerPort::Core))
    );
    assert_eq!(base.compensation().segments(), 3);
}

#[test]
fn zero_ring_power_rejected() {
    let mut figure = wobble_figure(&[0.0, 0.1, -0.1, 0.0]);
    figure.power_modulation_mode = 2;
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3));
    base.set_wobble_figure(Some(figure));
    assert_eq!(base.define_wobble_figure(WobbleMode::Free), Err(WobbleError::NominalRingPowerWrong));
}

#[test]
fn free_figure_vectors() {
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3));
    base.set_wobble_figure(Some(wobble_figure(&[0.0, 0.1, -0.1, 0.0])));
    assert_eq!(base.resolve_wobble().unwrap(), WobbleResult::OnePortWobbling(PowerPort::Core));

    let c = base.compensation();
    assert_eq!(c.divisor, 1);
    assert_eq!(c.shift, 0);
    assert_eq!(c.nominal_power, 0.5);
    let expected_trans = [0.0, -0.1, 0.1];
    let expected_long = [0.1, 0.0, -0.1];
    let expected_power = [0.0, 0.2, -0.4];
    for k in 0..3 {
        assert_abs_diff_eq!(c.wobbel_trans_vector[k], expected_trans[k], epsilon = 1e-9);
        assert_abs_diff_eq!(c.wobbel_long_vector[k], expected_long[k], epsilon = 1e-9);
        assert_abs_diff_eq!(c.delta_power[k], expected_power[k], epsilon = 1e-9);
        assert_eq!(c.delta_ring_power[k], 0.0);
    }
}

#[test]
fn two_port_needs_even_micro_vector_factor() {
    let mut figure = wobble_figure(&[0.0, 0.1, -0.1, 0.0]);
    figure.power_modulation_mode = 3;
    figure.micro_vector_factor = 3;
    let data = WeldingData {
        laser_power_ring: 0.3,
        ..free_wobble(0.5, WeldingMode::Welding)
    };
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&data, weld_figure(3));
    base.set_wobble_figure(Some(figure.clone()));
    assert_eq!(
        base.define_wobble_figure(WobbleMode::Free),
        Err(WobbleError::InvalidMicroVectorFactor(3))
    );

    figure.micro_vector_factor = 4;
    base.set_wobble_figure(Some(figure));
    assert_eq!(base.define_wobble_figure(WobbleMode::Free), Ok(WobbleResult::TwoPortWobbling));
    // divisor 2 leaves 2 micro-vectors per segment
    assert_eq!(base.compensation().divisor, 2);
    assert_eq!(base.compensation().segments(), 6);
}

#[test]
fn too_many_segments() {
    let figure = Figure::new((0..1100).map(|k| Order::new(k as f64 * 0.001, 0.0, 0.0, 0.0, -1.0)).collect());
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3));
    base.set_wobble_figure(Some(figure));
    let err = base.define_wobble_figure(WobbleMode::Free).unwrap_err();
    assert_eq!(err, WobbleError::TooManySegments { segments: 1099, limit: 1023 });
    assert!(err.is_fatal());
}

#[test]
fn abandoned_compensation_welds_without_wobble() {
    let config = ScannerConfig {
        laser_power_delay_compensation: 100,
        ..ScannerConfig::default()
    };
    let mut base = FigureWeldingBase::new(config);
    base.prepare(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3));
    base.set_wobble_figure(Some(wobble_figure(&[0.0, 0.1, -0.1, 0.0])));
    let err = base.define_wobble_figure(WobbleMode::Free).unwrap_err();
    assert_eq!(err, WobbleError::CompensationAbandoned { shift: 10, segments: 3 });
    assert!(!err.is_fatal());
    assert_eq!(base.compensation().nominal_power, 0.0);
    assert_eq!(base.resolve_wobble().unwrap(), WobbleResult::NoWobbling);
}

#[test]
fn missing_wobble_figure_is_not_fatal() {
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3));
    assert_eq!(base.define_wobble_figure(WobbleMode::Free), Err(WobbleError::InvalidWobbleFigure));
    assert_eq!(base.resolve_wobble().unwrap(), WobbleResult::NoWobbling);
    assert_eq!(
        base.define_wobble_figure(WobbleMode::Ellipse),
        Ok(WobbleResult::BasicFigure(WobbleMode::Ellipse))
    );
}

#[test]
fn special_values() {
    assert_eq!(translate_special_value(-1.0, None, 5.0), 5.0);
    assert_eq!(translate_special_value(-1.0, Some(3.0), 5.0), 3.0);
    assert_eq!(translate_special_value(-2.0, Some(3.0), 5.0), 5.0);
    assert_eq!(translate_special_value(0.7, Some(3.0), 5.0), 0.7);

    let data = WeldingData {
        laser_power: 0.4,
        laser_power_ring: 0.1,
        velocity: 80.0,
        ..WeldingData::default()
    };
    let points = [
        Order::new(0.0, 0.0, -1.0, -2.0, -1.0),
        Order::new(1.0, 0.0, 0.3, -1.0, -2.0),
        Order::new(2.0, 0.0, -1.0, 0.2, -1.0),
    ];
    assert_eq!(
        resolve_special_values(&points, &data),
        vec![
            Order::new(0.0, 0.0, 0.4, 0.1, 80.0),
            Order::new(1.0, 0.0, 0.3, 0.1, 80.0),
            Order::new(2.0, 0.0, 0.3, 0.2, 80.0),
        ]
    );
}

#[test]
fn contour_with_run_up_and_offset() {
    let config = ScannerConfig {
        laser_delay: 10.0,
        ..ScannerConfig::default()
    };
    let data = WeldingData {
        laser_power: 0.4,
        offset: (0.5, 0.0),
        ..WeldingData::default()
    };
    let figure = Figure::new(vec![
        Order::new(0.0, 0.0, -2.0, 0.0, -1.0),
        Order::new(2.0, 0.0, -1.0, 0.0, -1.0),
    ]);
    let mut base = FigureWeldingBase::new(config);
    base.prepare(&data, figure);
    assert_eq!(base.start_position(), Some((0.5, 0.0)));
    // 100 mm/s during 10 ms gives 1 mm of run-up
    assert_eq!(
        base.compile_contour().unwrap(),
        vec![
            ContourCommand::Initialize,
            ContourCommand::Jump { x: -0.5, y: 0.0 },
            ContourCommand::MarkSpeed { speed: 100.0 },
            ContourCommand::LaserPower { power: 40.0 },
            ContourCommand::RingLaserPower { power: 0.0 },
            ContourCommand::Mark { x: 0.5, y: 0.0 },
            ContourCommand::MarkSpeed { speed: 100.0 },
            ContourCommand::LaserPower { power: 40.0 },
            ContourCommand::RingLaserPower { power: 0.0 },
            ContourCommand::Mark { x: 2.5, y: 0.0 },
        ]
    );
}

#[test]
fn preview_contour_keeps_laser_off() {
    let data = WeldingData {
        mode: WeldingMode::ScanlabPreview,
        ..WeldingData::default()
    };
    let mut base = FigureWeldingBase::new(ScannerConfig::default());
    base.prepare(&data, weld_figure(3));
    let contour = base.compile_contour().unwrap();
    let powers: Vec<&ContourCommand> = contour
        .iter()
        .filter(|c| matches!(c, ContourCommand::LaserPower { .. } | ContourCommand::RingLaserPower { .. }))
        .collect();
    assert_eq!(
        powers,
        vec![&ContourCommand::LaserPower { power: 0.0 }, &ContourCommand::RingLaserPower { power: 0.0 }]
    );
}

#[test]
fn call_order_enforced() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    assert!(matches!(
        welding.build_welding_list(),
        Err(Error::OutOfOrder { state: ListState::Idle, .. })
    ));
    assert!(matches!(
        welding.prepare_welding_list(&WeldingData::default(), Figure::new(vec![])),
        Err(Error::NoWeldFigure)
    ));
    welding.prepare_welding_list(&WeldingData::default(), weld_figure(2)).unwrap();
    assert_eq!(welding.base().state(), ListState::SpeedsAndOffsetsSet);
    welding.build_welding_list().unwrap();
    assert!(matches!(
        welding.build_welding_list(),
        Err(Error::OutOfOrder { state: ListState::ListBuilt, .. })
    ));
    welding.reset_seam();
    assert_eq!(welding.base().state(), ListState::Idle);
    assert!(welding.base().weld_figure().is_none());
}

#[test]
fn wobble_file_after_prepare_defines_figure() {
    let path = std::env::temp_dir().join("weld_scanner_wobble_define.json");
    std::fs::write(
        &path,
        r#"{"Name": "triangle", "ID": 1, "Description": "",
            "Figure": [{"EndPosition": [0.0, 0.0], "Power": 0.0},
                       {"EndPosition": [0.1, 0.0], "Power": 0.1},
                       {"EndPosition": [0.1, 0.1], "Power": -0.1},
                       {"EndPosition": [0.0, 0.0], "Power": 0.0}]}"#,
    )
    .unwrap();
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    welding.prepare_welding_list(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3)).unwrap();
    welding.load_wobble_figure_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(welding.base().state(), ListState::WobbleDefined);
    assert_eq!(welding.base().wobble(), WobbleResult::OnePortWobbling(PowerPort::Core));

    let missing = std::env::temp_dir().join("weld_scanner_no_such_wobble.json");
    let err = welding.load_wobble_figure_file(&missing).unwrap_err();
    assert!(!err.is_fatal());
    assert!(welding.base().wobble_figure().is_none());
}

#[test]
fn rtc6_list_calls() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    let data = WeldingData {
        seam: 2,
        laser_power: 0.5,
        ..WeldingData::default()
    };
    welding.prepare_welding_list(&data, weld_figure(3)).unwrap();
    welding.build_welding_list().unwrap();
    assert_eq!(
        welding.driver().calls(),
        vec![
            Rtc6Call::LoadList(1, 0),
            Rtc6Call::SetJumpSpeed(4000.0),
            Rtc6Call::SetWobbelMode(0, 0, 0.0, 0),
            Rtc6Call::JumpAbs(0, 0),
            Rtc6Call::SetMarkSpeed(400.0),
            Rtc6Call::SetLaserPower(1, 2048),
            Rtc6Call::SetLaserPower(2, 0),
            Rtc6Call::MarkAbs(4000, 0),
            Rtc6Call::MarkAbs(8000, 0),
            Rtc6Call::SetEndOfList,
        ]
    );

    welding.start_mark().unwrap();
    assert_eq!(welding.base().state(), ListState::Dispatched);
    welding.stop_mark().unwrap();
    welding.move_to(0.25, -1.0).unwrap();
    let calls = welding.driver().calls();
    assert_eq!(
        calls[calls.len() - 4..].to_vec(),
        vec![
            Rtc6Call::ExecuteList(1),
            Rtc6Call::StopExecution,
            Rtc6Call::ResetError(u32::MAX),
            Rtc6Call::GotoXy(1000, -4000),
        ]
    );
}

#[test]
fn rtc6_free_wobble_vectors() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    welding.prepare_welding_list(&free_wobble(0.5, WeldingMode::Welding), weld_figure(3)).unwrap();
    welding.base_mut().set_wobble_figure(Some(wobble_figure(&[0.0, 0.1, -0.1, 0.0])));
    welding.build_welding_list().unwrap();

    let driver = welding.driver();
    assert_eq!(driver.count(|c| matches!(c, Rtc6Call::SetWobbelVector(..))), 3);
    let calls = driver.calls();
    assert!(calls.contains(&Rtc6Call::SetWobbelMode(0, 0, 200.0, 4)));
    let n = calls.len();
    assert_eq!(calls[n - 2], Rtc6Call::SetWobbelMode(0, 0, 0.0, 0));
    assert_eq!(calls[n - 1], Rtc6Call::SetEndOfList);
}

#[test]
fn rtc6_basic_wobble_amplitudes() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    let data = WeldingData {
        wobble_mode: WobbleMode::LyingEight,
        wobble_amplitude: (0.25, 0.5),
        wobble_frequency: 150.0,
        laser_power: 0.5,
        ..WeldingData::default()
    };
    welding.prepare_welding_list(&data, weld_figure(2)).unwrap();
    welding.build_welding_list().unwrap();
    assert_eq!(welding.driver().calls()[2], Rtc6Call::SetWobbelMode(1000, 2000, 150.0, -1));
}

#[test]
fn rtc6_fatal_wobble_aborts_list() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    welding.prepare_welding_list(&free_wobble(0.0, WeldingMode::Welding), weld_figure(3)).unwrap();
    welding.base_mut().set_wobble_figure(Some(wobble_figure(&[0.0, 0.15, -0.75, 0.6])));
    let err = welding.build_welding_list().unwrap_err();
    assert!(matches!(err, Error::Wobble(WobbleError::NominalPowerWrong)));
    assert!(err.is_fatal());
    assert!(welding.driver().calls().is_empty());
}

#[test]
fn rtc6_list_memory_exceeded() {
    let config = ScannerConfig {
        list_memory: 1024 + 100,
        ..ScannerConfig::default()
    };
    let mut welding = FigureWelding::new(config, RecordingDriver::new());
    assert_eq!(FigureWelding::<RecordingDriver>::number_of_points_from_contour(30), 128);
    assert_eq!(welding.number_of_possible_points_for_list_memory(), 100);
    welding.prepare_welding_list(&WeldingData::default(), weld_figure(30)).unwrap();
    let err = welding.build_welding_list().unwrap_err();
    assert!(matches!(err, Error::TooManyContourPoints { needed: 128, capacity: 100 }));
    assert!(err.is_fatal());
    assert!(welding.driver().calls().is_empty());
}

#[test]
fn rtc6_busy_list() {
    let mut welding = FigureWelding::new(ScannerConfig::default(), RecordingDriver::new());
    welding.driver().set_executing(true);
    welding.prepare_welding_list(&WeldingData::default(), weld_figure(2)).unwrap();
    assert!(matches!(welding.build_welding_list(), Err(Error::ListBusy(1))));
}
