//! End-to-end attribute access against the simulated DSP 7265.

use lockin_daq::adapters::MockLink;
use lockin_daq::attributes::{self, names, AttributeKind};
use lockin_daq::link::registers;
use lockin_daq::{
    AttributeValue, DaqError, DeviceBinding, DeviceProperties, DeviceState, Dsp7265,
};
use std::sync::Arc;
use std::time::Duration;

fn adapter() -> (Arc<MockLink>, Arc<Dsp7265>) {
    let link = Arc::new(MockLink::new());
    let adapter = Arc::new(Dsp7265::new(link.clone(), Duration::from_millis(500)).unwrap());
    (link, adapter)
}

#[tokio::test]
async fn test_every_enumerated_index_round_trips_through_the_link() {
    let (_link, adapter) = adapter();
    let enumerated: Vec<String> = adapter
        .registry()
        .iter()
        .filter(|d| d.kind == AttributeKind::Enumerated)
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(enumerated.len(), 5);

    for name in enumerated {
        let len = adapter.describe(&name).unwrap().len();
        for index in 0..len {
            adapter
                .write(&name, AttributeValue::Index(index))
                .await
                .unwrap();
            assert_eq!(
                adapter.read(&name).await.unwrap(),
                AttributeValue::Index(index),
                "{name}[{index}]"
            );
        }
    }
}

#[tokio::test]
async fn test_gain_thirty_db_scenario() {
    let (link, adapter) = adapter();
    adapter
        .write(names::GAIN, AttributeValue::Index(3))
        .await
        .unwrap();
    assert_eq!(link.raw(registers::GAIN).await, Some(30.0));
    assert_eq!(
        adapter.read(names::GAIN).await.unwrap(),
        AttributeValue::Index(3)
    );
    assert_eq!(
        adapter.describe(names::GAIN).unwrap().label_of(3),
        Some("30 db")
    );
}

#[tokio::test]
async fn test_time_constant_five_ms_scenario() {
    let (link, adapter) = adapter();
    adapter
        .write(names::TIME_CONSTANT, AttributeValue::Index(7))
        .await
        .unwrap();
    assert_eq!(link.raw(registers::TIME_CONSTANT).await, Some(5.0e-3));
    assert_eq!(
        adapter.read(names::TIME_CONSTANT).await.unwrap(),
        AttributeValue::Index(7)
    );
}

#[tokio::test]
async fn test_magnitude_reads_in_nanovolts() {
    let (link, adapter) = adapter();
    link.set_raw(registers::MAGNITUDE, 1e-9).await;
    let r = adapter.read(names::R).await.unwrap().as_scalar().unwrap();
    assert!((r - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_frequency_is_bounded() {
    let (link, adapter) = adapter();
    let err = adapter
        .write(names::FREQUENCY, AttributeValue::Scalar(300_000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DaqError::OutOfBounds { .. }));
    assert_eq!(link.raw(registers::FREQUENCY).await, Some(1000.0));

    adapter
        .write(names::FREQUENCY, AttributeValue::Scalar(1000.0))
        .await
        .unwrap();
    assert_eq!(
        adapter.read(names::FREQUENCY).await.unwrap(),
        AttributeValue::Scalar(1000.0)
    );
}

#[tokio::test]
async fn test_unmatched_sensitivity_is_never_reported_as_first_option() {
    let (link, adapter) = adapter();
    link.set_raw(registers::SENSITIVITY, 3.3e-3).await;
    let err = adapter.read(names::SENSITIVITY).await.unwrap_err();
    assert!(matches!(err, DaqError::NoMatchingValue { .. }));
}

#[tokio::test]
async fn test_flags_follow_exact_one() {
    let (link, adapter) = adapter();
    adapter
        .write(names::GROUND, AttributeValue::Boolean(true))
        .await
        .unwrap();
    assert_eq!(link.raw(registers::GROUND).await, Some(1.0));

    link.set_raw(registers::COUPLING, 0.5).await;
    assert_eq!(
        adapter.read(names::AC_COUPLING).await.unwrap(),
        AttributeValue::Boolean(false)
    );
}

#[tokio::test]
async fn test_parsed_cli_input_reaches_the_register() {
    let (link, adapter) = adapter();
    let slope = adapter.describe(names::SLOPE).unwrap();
    let value = attributes::parse_value(slope, "24 db/octave").unwrap();
    adapter.write(names::SLOPE, value).await.unwrap();
    assert_eq!(link.raw(registers::SLOPE).await, Some(24.0));
}

#[tokio::test]
async fn test_binding_lifecycle() {
    let (link, adapter) = adapter();
    let properties = DeviceProperties {
        address: "GPIB0::7::INSTR".to_string(),
        reference: "external rear".to_string(),
    };
    let binding = DeviceBinding::init(adapter, properties).await.unwrap();
    assert_eq!(binding.state().await, DeviceState::On);
    assert_eq!(link.raw(registers::REFERENCE).await, Some(1.0));
    assert_eq!(
        binding.read_formatted(names::REFERENCE).await.unwrap(),
        "external rear"
    );

    link.set_unavailable(true);
    for _ in 0..3 {
        let err = binding.read_attribute(names::THETA).await.unwrap_err();
        assert!(err.is_transient());
    }
    assert_eq!(binding.state().await, DeviceState::Fault);
    assert_eq!(binding.status().await, "The device is in FAULT state.");

    binding.reconnect().await.unwrap();
    assert_eq!(binding.state().await, DeviceState::On);
    assert_eq!(link.reconnect_count(), 1);
}

#[tokio::test]
async fn test_polling_and_writing_share_the_link() {
    let (link, adapter) = adapter();
    link.set_latency(Duration::from_millis(2));
    link.set_signal(3e-9, 4e-9).await;

    let poller = {
        let adapter = adapter.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                adapter.read(names::R).await.unwrap();
            }
        })
    };
    for index in 0..10 {
        adapter
            .write(names::GAIN, AttributeValue::Index(index))
            .await
            .unwrap();
    }
    poller.await.unwrap();

    assert_eq!(link.max_concurrency(), 1);
    let r = adapter.read(names::R).await.unwrap().as_scalar().unwrap();
    assert!((r - 5.0).abs() < 1e-6);
}
