use crate::ready_grbl;
use parking_lot::Mutex;
use stagekit_communication::StageListener;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl StageListener for Recorder {
    fn on_position_changed(&self, x_um: f64, y_um: f64) {
        self.events.lock().push(format!("xy {:.0} {:.0}", x_um, y_um));
    }

    fn on_z_position_changed(&self, z_um: f64) {
        self.events.lock().push(format!("z {:.0}", z_um));
    }

    fn on_status_changed(&self, state: &str) {
        self.events.lock().push(format!("status {}", state));
    }
}

#[test]
fn test_listeners_hear_moves_and_status() {
    let (device, _) = ready_grbl();
    let recorder = Arc::new(Recorder::default());
    let handle = device.register_listener(recorder.clone());

    device.move_absolute_steps(250, 500).unwrap();
    device.set_z_position_steps(25).unwrap();
    device.query_status().unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec!["xy 1000 2000", "z 100", "status Idle"]
    );

    assert!(device.unregister_listener(&handle));
    device.move_relative_steps(1, 1).unwrap();
    assert_eq!(recorder.events.lock().len(), 3);
}

#[test]
fn test_relative_target_survives_mid_move_status() {
    let (device, sim) = ready_grbl();
    let recorder = Arc::new(Recorder::default());
    device.register_listener(recorder.clone());

    device.move_relative_steps(250, 0).unwrap();
    sim.set_status_override(Some(
        "<Run,MPos:0.400,0.000,0.000,WPos:0.400,0.000,0.000>".to_string(),
    ));
    assert!(device.is_busy());
    sim.set_status_override(None);

    device.move_relative_steps(250, 0).unwrap();
    assert_eq!(sim.position().x, 2.0);

    let events = recorder.events.lock();
    let moves: Vec<&str> = events
        .iter()
        .map(String::as_str)
        .filter(|e| e.starts_with("xy"))
        .collect();
    assert_eq!(moves, vec!["xy 1000 0", "xy 2000 0"]);
}
