use std::time::SystemTime;

use bytes::{Buf, BufMut, BytesMut};
use log::trace;
use packed_struct::PackedStruct;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::addresses::*;
use super::commands::{Command, CommandCode, Response};


pub const PREAMBLE: u8 = 0xaa;
pub const PROLOGUE: u8 = 0x55;

pub const TX_FRAME_SIZE: usize = 16;
pub const RX_FRAME_SIZE: usize = 32;

pub const TX_PAYLOAD_SIZE: usize = 8;
pub const RX_PAYLOAD_SIZE: usize = 24;

/// Offset of the first payload byte, identical in both directions.
const PAYLOAD_START: usize = 6;


#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("invalid frame length (expected {expected}, actual: {actual})")]
    InvalidLength {
        expected: usize,
        actual: usize
    },
    #[error("start of frame marker not found")]
    PreambleNotFound,
    #[error("end of frame marker not found")]
    PrologueNotFound,
    #[error("invalid checksum (expected {expected:02x}, actual: {actual:02x})")]
    InvalidChecksum {
        expected: u8,
        actual: u8,
    },
}


/// Computes the XYE checksum of `frame`.
///
/// Every byte except the one at `skip` (the checksum's own slot) is summed,
/// truncated to 8 bits and subtracted from `0xff`.
pub fn checksum(frame: &[u8], skip: usize) -> u8 {
    let sum = frame.iter()
        .enumerate()
        .filter(|(idx, _)| *idx != skip)
        .fold(0u8, |acc, (_, byte)| acc.wrapping_add(*byte));

    0xff - sum
}

/// Validate the markers and checksum of a complete `N` byte frame.
fn check_frame<const N: usize>(bytes: &[u8]) -> Result<[u8; N], FramingError> {
    let frame = <[u8; N]>::try_from(bytes)
        .map_err(|_| FramingError::InvalidLength { expected: N, actual: bytes.len() })?;

    if frame[0] != PREAMBLE {
        return Err(FramingError::PreambleNotFound)
    }

    if frame[N - 1] != PROLOGUE {
        return Err(FramingError::PrologueNotFound)
    }

    let expected = checksum(&frame, N - 2);
    let actual = frame[N - 2];
    if expected != actual {
        return Err(FramingError::InvalidChecksum { expected, actual })
    }

    Ok(frame)
}


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameId {
    /// Command
    pub cmd: u8,

    /// Source node
    pub src: u8,

    /// Destination node
    pub dst: u8,

    /// Direction marker
    pub direction: u8,
}

impl FrameId {
    /// Header of a frame sent by the controller to the unit.
    pub fn to_unit(cmd: u8) -> Self {
        Self { cmd, src: CONTROLLER_ID, dst: UNIT_ID, direction: FROM_CONTROLLER }
    }

    /// Header of a frame sent by the unit to the controller.
    pub fn to_controller(cmd: u8) -> Self {
        Self { cmd, src: UNIT_ID, dst: CONTROLLER_ID, direction: TO_CONTROLLER }
    }

    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::from_repr(self.cmd)
    }
}


/// A 16 byte frame sent from the controller to the unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxFrame {
    pub id: FrameId,
    pub payload: [u8; TX_PAYLOAD_SIZE]
}

impl TxFrame {
    pub fn new(cmd: CommandCode, payload: [u8; TX_PAYLOAD_SIZE]) -> Self {
        Self {
            id: FrameId::to_unit(cmd.into()),
            payload
        }
    }

    /// Pack a `Command` `PackedStruct` into a new `TxFrame`.
    pub fn pack<T>(cmd: T) -> Result<Self, packed_struct::PackingError> where
        T: PackedStruct<ByteArray = [u8; TX_PAYLOAD_SIZE]> + Command
    {
        Ok(Self::new(T::ID, cmd.pack()?))
    }

    /// Unpack the payload as a `Command` `PackedStruct`.
    pub fn unpack_as<T>(&self) -> Result<T, packed_struct::PackingError> where
        T: PackedStruct<ByteArray = [u8; TX_PAYLOAD_SIZE]> + Command
    {
        T::unpack(&self.payload)
    }

    /// Serialize the frame. The checksum is computed last, over every other byte.
    pub fn encode(&self) -> [u8; TX_FRAME_SIZE] {
        let mut frame = [0x00; TX_FRAME_SIZE];

        frame[0] = PREAMBLE;
        frame[1] = self.id.cmd;
        frame[2] = self.id.dst;
        frame[3] = self.id.src;
        frame[4] = self.id.direction;
        frame[5] = self.id.src;
        frame[PAYLOAD_START..PAYLOAD_START + TX_PAYLOAD_SIZE].copy_from_slice(&self.payload);
        frame[TX_FRAME_SIZE - 1] = PROLOGUE;
        frame[TX_FRAME_SIZE - 2] = checksum(&frame, TX_FRAME_SIZE - 2);

        frame
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        let frame = check_frame::<TX_FRAME_SIZE>(bytes)?;

        let mut payload = [0x00; TX_PAYLOAD_SIZE];
        payload.copy_from_slice(&frame[PAYLOAD_START..PAYLOAD_START + TX_PAYLOAD_SIZE]);

        Ok(Self {
            id: FrameId {
                cmd: frame[1],
                dst: frame[2],
                src: frame[3],
                direction: frame[4],
            },
            payload
        })
    }
}

/// Builds a complete transmit frame for `cmd` around a raw payload.
pub fn encode_transmit(cmd: CommandCode, payload: [u8; TX_PAYLOAD_SIZE]) -> [u8; TX_FRAME_SIZE] {
    TxFrame::new(cmd, payload).encode()
}


/// A 32 byte frame sent from the unit to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RxFrame {
    pub id: FrameId,
    pub payload: [u8; RX_PAYLOAD_SIZE]
}

impl RxFrame {
    pub fn new(cmd: u8, payload: [u8; RX_PAYLOAD_SIZE]) -> Self {
        Self {
            id: FrameId::to_controller(cmd),
            payload
        }
    }

    /// Pack a `Command` `PackedStruct` into a new `RxFrame`.
    pub fn pack<T>(cmd: T) -> Result<Self, packed_struct::PackingError> where
        T: PackedStruct<ByteArray = [u8; RX_PAYLOAD_SIZE]> + Command
    {
        Ok(Self::new(T::ID.into(), cmd.pack()?))
    }

    /// Unpack the payload as a `Command` `PackedStruct`.
    pub fn unpack_as<T>(&self) -> Result<T, packed_struct::PackingError> where
        T: PackedStruct<ByteArray = [u8; RX_PAYLOAD_SIZE]> + Command
    {
        T::unpack(&self.payload)
    }

    /// Interpret the payload according to the command echoed in the header.
    pub fn response(&self) -> Result<Response, packed_struct::PackingError> {
        Response::unpack(self.id.cmd, &self.payload)
    }

    pub fn encode(&self) -> [u8; RX_FRAME_SIZE] {
        let mut frame = [0x00; RX_FRAME_SIZE];

        frame[0] = PREAMBLE;
        frame[1] = self.id.cmd;
        frame[2] = self.id.direction;
        frame[3] = self.id.dst;
        frame[4] = self.id.src;
        frame[5] = self.id.dst;
        frame[PAYLOAD_START..PAYLOAD_START + RX_PAYLOAD_SIZE].copy_from_slice(&self.payload);
        frame[RX_FRAME_SIZE - 1] = PROLOGUE;
        frame[RX_FRAME_SIZE - 2] = checksum(&frame, RX_FRAME_SIZE - 2);

        frame
    }

    /// Decode a received frame.
    ///
    /// Nothing of the frame is exposed unless the preamble, prologue and
    /// checksum all validate.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        let frame = check_frame::<RX_FRAME_SIZE>(bytes)?;

        let mut payload = [0x00; RX_PAYLOAD_SIZE];
        payload.copy_from_slice(&frame[PAYLOAD_START..PAYLOAD_START + RX_PAYLOAD_SIZE]);

        Ok(Self {
            id: FrameId {
                cmd: frame[1],
                direction: frame[2],
                dst: frame[3],
                src: frame[4],
            },
            payload
        })
    }
}

pub fn decode_receive(bytes: &[u8]) -> Result<RxFrame, FramingError> {
    RxFrame::decode(bytes)
}


/// Any frame seen on the bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusFrame {
    Tx(TxFrame),
    Rx(RxFrame)
}

impl BusFrame {
    pub fn id(&self) -> FrameId {
        match self {
            BusFrame::Tx(frame) => frame.id,
            BusFrame::Rx(frame) => frame.id,
        }
    }
}

impl From<TxFrame> for BusFrame {
    fn from(frame: TxFrame) -> Self {
        BusFrame::Tx(frame)
    }
}

impl From<RxFrame> for BusFrame {
    fn from(frame: RxFrame) -> Self {
        BusFrame::Rx(frame)
    }
}


pub fn delta_ms(time: Option<SystemTime>) -> u128 {
    time.and_then(|time| time.elapsed().ok())
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}


/// Frames a raw XYE byte stream, as seen by a bus sniffer or an emulated unit.
#[derive(Debug)]
pub struct XyeCodec {
    start_time: SystemTime,
}

impl XyeCodec {
    pub fn new() -> Self {
        XyeCodec {
            start_time: SystemTime::now(),
        }
    }
}

impl Default for XyeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for XyeCodec {
    type Item = BusFrame;

    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(&first) = src.first() else {
                return Ok(None)
            };

            if first != PREAMBLE {
                // skip junk to resync
                src.advance(1);
                continue;
            }

            // try a controller frame first, falling back to a (longer) unit frame
            if src.len() < TX_FRAME_SIZE {
                return Ok(None)
            }

            if let Ok(frame) = TxFrame::decode(&src[..TX_FRAME_SIZE]) {
                trace!("RX {:8}: {:02x?}", delta_ms(Some(self.start_time)), &src[..TX_FRAME_SIZE]);
                src.advance(TX_FRAME_SIZE);
                return Ok(Some(BusFrame::Tx(frame)))
            }

            if src.len() < RX_FRAME_SIZE {
                return Ok(None)
            }

            match RxFrame::decode(&src[..RX_FRAME_SIZE]) {
                Ok(frame) => {
                    trace!("RX {:8}: {:02x?}", delta_ms(Some(self.start_time)), &src[..RX_FRAME_SIZE]);
                    src.advance(RX_FRAME_SIZE);
                    return Ok(Some(BusFrame::Rx(frame)))
                }
                Err(err) => {
                    // the preamble was likely inside a previous frame -- skip it
                    trace!("resync: {err}");
                    src.advance(1);
                    continue;
                }
            }
        }
    }
}

impl Encoder<BusFrame> for XyeCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: BusFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            BusFrame::Tx(frame) => dst.put(&frame.encode()[..]),
            BusFrame::Rx(frame) => dst.put(&frame.encode()[..]),
        }

        trace!("TX {:8}: {:02x?}", delta_ms(Some(self.start_time)), &dst[..]);

        Ok(())
    }
}
