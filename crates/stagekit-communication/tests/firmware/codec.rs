use stagekit_communication::firmware::codec::*;
use stagekit_communication::firmware::ControllerType;
use stagekit_core::CoordinateMode;

#[test]
fn test_absolute_move_line() {
    let command = build_move(1.5, -0.004, true);
    assert_eq!(command.mode, CoordinateMode::Absolute);
    assert_eq!(command.command.text(), "G0 X1.500000 Y-0.004000");
    assert_eq!(command.command.class, TimeoutClass::Move);
}

#[test]
fn test_relative_z_move_line() {
    let command = build_move_z(0.25, false);
    assert_eq!(command.mode, CoordinateMode::Relative);
    assert_eq!(command.command.text(), "G0 Z0.250000");
}

#[test]
fn test_mode_switch_lines() {
    assert_eq!(
        build_mode_switch(CoordinateMode::Absolute).map(|c| c.text()),
        Some("G90".to_string())
    );
    assert_eq!(
        build_mode_switch(CoordinateMode::Relative).map(|c| c.text()),
        Some("G91".to_string())
    );
    assert!(build_mode_switch(CoordinateMode::Homing).is_none());
}

#[test]
fn test_home_per_controller() {
    assert_eq!(build_home(ControllerType::Grbl).text(), "$H");
    assert_eq!(build_home(ControllerType::TinyG).text(), "G28.2 X0 Y0");
    assert_eq!(build_home(ControllerType::Grbl).class, TimeoutClass::Extended);
}

#[test]
fn test_status_query_shapes() {
    let grbl = build_status_query(ControllerType::Grbl);
    assert_eq!(grbl.text(), "?");
    assert_eq!(grbl.reply, ReplyShape::Line);

    let tinyg = build_status_query(ControllerType::TinyG);
    assert_eq!(tinyg.text(), "$sr");
    assert_eq!(tinyg.reply, ReplyShape::UntilQuiet);
}

#[test]
fn test_parameter_lines() {
    assert_eq!(build_parameter_query().text(), "$$");
    assert_eq!(build_parameter_set("$110", "800").text(), "$110=800");
    assert_eq!(build_sync_set(1, 0.5).text(), "M108P0.5Q1");
}

#[test]
fn test_realtime_bytes() {
    let reset = build_reset();
    assert_eq!(reset.payload, Payload::Byte(RESET_BYTE));
    assert_eq!(reset.class, TimeoutClass::Reset);

    let hold = build_feed_hold();
    assert_eq!(hold.payload, Payload::Byte(b'!'));
    assert_eq!(hold.reply, ReplyShape::NoReply);
}
