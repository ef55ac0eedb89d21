//! Service and characteristic UUIDs used to reach the teapot.

use uuid::Uuid;

/// Standard Serial Port Profile service class UUID (RFCOMM).
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_00805f9b34fb);

// UART Service (Nordic NUS), used by BLE serial bridges on the ESP32
/// Nordic UART Service UUID.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// UART RX characteristic UUID (write to the teapot).
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// UART TX characteristic UUID (notifications from the teapot).
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Map a serial service identifier to the GATT service that carries it over BLE.
///
/// SPP has no GATT form, so it is bridged over the UART service. Any other
/// UUID is assumed to already name a GATT service.
pub fn gatt_service_for(service_uuid: &Uuid) -> Uuid {
    if *service_uuid == SPP_SERVICE_UUID {
        UART_SERVICE_UUID
    } else {
        *service_uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spp_uuid_format() {
        assert_eq!(
            SPP_SERVICE_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_gatt_service_for() {
        assert_eq!(gatt_service_for(&SPP_SERVICE_UUID), UART_SERVICE_UUID);
        assert_eq!(gatt_service_for(&UART_SERVICE_UUID), UART_SERVICE_UUID);
    }
}
