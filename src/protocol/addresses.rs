/// ID of the indoor unit (server) on the bus.
pub const UNIT_ID: u8 = 0x00;

/// ID used by the wired controller (client). Repeated twice in the transmit header.
pub const CONTROLLER_ID: u8 = 0x00;

/// Direction byte of frames sent by the controller.
pub const FROM_CONTROLLER: u8 = 0x00;

/// Direction byte of frames sent by the unit.
pub const TO_CONTROLLER: u8 = 0x00;
