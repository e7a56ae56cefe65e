//! # stagekit Communication
//!
//! Host-side driver for Grbl and TinyG motion controllers over a serial
//! line. Covers the transport, the G-code command codec, status decoding
//! in both the compact and verbose dialects, the serialized command
//! engine, background status polling and the [`StageDevice`] surface.

pub mod communication;
pub mod firmware;
pub mod stage;

pub use communication::{
    engine::{CommandEngine, CommandOutcome, TimeoutPolicy},
    poller::{StatusCallback, StatusPoller},
    serial::{list_ports, SerialPortInfo, SerialTransport},
    serial_opener,
    simulator::{SimulatedController, SimulatorHandle},
    ConnectionParams, Transport, TransportOpener,
};

pub use firmware::{
    ControllerType, FirmwareIdentity, FirmwareParameter, ParameterTable, StatusDialect,
    StatusParser,
};

pub use stage::{
    DetectionStatus, ListenerRegistry, StageDevice, StageListener, StageListenerHandle,
    StageProperty,
};
