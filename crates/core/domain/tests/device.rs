use domain::{CommandStatus, DeviceId, DeviceKind, LifecycleState};

#[test]
fn device_kind_from_code_prefix() {
    assert_eq!(DeviceKind::from_code("DIBANG-001"), Some(DeviceKind::WeighScale));
    assert_eq!(
        DeviceKind::from_code("ZNDIBANG-002"),
        Some(DeviceKind::SmartWeighScale)
    );
    assert_eq!(DeviceKind::from_code("RFID-001"), Some(DeviceKind::RfidReader));
    assert_eq!(DeviceKind::from_code("tadiao-003"), Some(DeviceKind::TowerCrane));
    assert_eq!(DeviceKind::from_code("ENV"), Some(DeviceKind::Environment));
    assert_eq!(DeviceKind::from_code("UNKNOWN-001"), None);
    assert_eq!(DeviceKind::from_code(""), None);
}

#[test]
fn every_kind_round_trips_through_prefix() {
    for kind in DeviceKind::ALL {
        let code = format!("{}-001", kind.prefix());
        assert_eq!(DeviceKind::from_code(&code), Some(kind));
    }
}

#[test]
fn wire_codes_match_field_convention() {
    assert_eq!(LifecycleState::Online.code(), 0);
    assert_eq!(LifecycleState::Offline.code(), 1);
    assert_eq!(LifecycleState::NoData.code(), 2);
    assert_eq!(LifecycleState::default(), LifecycleState::Offline);
    assert_eq!(CommandStatus::Cooperating.code(), 1);
    assert_eq!(CommandStatus::NotResponding.code(), 0);
    assert_eq!(DeviceId(42).to_string(), "42");
}
