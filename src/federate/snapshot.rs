//! Byte snapshots of a `FederateTimeRecord` for federation save/restore.
//!
//! Layout: a six byte header (version, temporal, regulating, constrained, pending kind,
//! presence flags) followed by the raw `Pod` bytes of `federate_time` and then each present
//! optional field in declaration order.
use bytemuck::{bytes_of, try_pod_read_unaligned, Pod};

use crate::{
    federate::record::{ConstrainedState, FederateTimeRecord, RegulatingState, TemporalState},
    messages::{AdvanceKind, PendingRequest},
    time::LogicalTime,
    TimeError,
};

const SNAPSHOT_VERSION: u8 = 1;
const HEADER_LEN: usize = 6;
const NO_PENDING: u8 = u8::MAX;

const HAS_LOOKAHEAD: u8 = 1 << 0;
const HAS_LOTS: u8 = 1 << 1;
const HAS_PENDING: u8 = 1 << 2;
const HAS_GALT: u8 = 1 << 3;
const HAS_REPORTED_LITS: u8 = 1 << 4;
const HAS_DELIVERY_BOUND: u8 = 1 << 5;

fn temporal_to_byte(state: TemporalState) -> u8 {
    match state {
        TemporalState::TimeGranted => 0,
        TemporalState::TimeAdvancing => 1,
    }
}

fn temporal_from_byte(byte: u8) -> Result<TemporalState, TimeError> {
    match byte {
        0 => Ok(TemporalState::TimeGranted),
        1 => Ok(TemporalState::TimeAdvancing),
        other => Err(TimeError::InvalidSnapshot(format!(
            "unknown temporal state {other}"
        ))),
    }
}

fn regulating_to_byte(state: RegulatingState) -> u8 {
    match state {
        RegulatingState::NotRegulating => 0,
        RegulatingState::BecomingRegulating => 1,
        RegulatingState::Regulating => 2,
    }
}

fn regulating_from_byte(byte: u8) -> Result<RegulatingState, TimeError> {
    match byte {
        0 => Ok(RegulatingState::NotRegulating),
        1 => Ok(RegulatingState::BecomingRegulating),
        2 => Ok(RegulatingState::Regulating),
        other => Err(TimeError::InvalidSnapshot(format!(
            "unknown regulating state {other}"
        ))),
    }
}

fn constrained_to_byte(state: ConstrainedState) -> u8 {
    match state {
        ConstrainedState::NotConstrained => 0,
        ConstrainedState::BecomingConstrained => 1,
        ConstrainedState::Constrained => 2,
    }
}

fn constrained_from_byte(byte: u8) -> Result<ConstrainedState, TimeError> {
    match byte {
        0 => Ok(ConstrainedState::NotConstrained),
        1 => Ok(ConstrainedState::BecomingConstrained),
        2 => Ok(ConstrainedState::Constrained),
        other => Err(TimeError::InvalidSnapshot(format!(
            "unknown constrained state {other}"
        ))),
    }
}

fn kind_to_byte(kind: AdvanceKind) -> u8 {
    match kind {
        AdvanceKind::TimeAdvanceRequest => 0,
        AdvanceKind::TimeAdvanceRequestAvailable => 1,
        AdvanceKind::NextMessageRequest => 2,
        AdvanceKind::NextMessageRequestAvailable => 3,
        AdvanceKind::FlushQueueRequest => 4,
    }
}

fn kind_from_byte(byte: u8) -> Result<AdvanceKind, TimeError> {
    match byte {
        0 => Ok(AdvanceKind::TimeAdvanceRequest),
        1 => Ok(AdvanceKind::TimeAdvanceRequestAvailable),
        2 => Ok(AdvanceKind::NextMessageRequest),
        3 => Ok(AdvanceKind::NextMessageRequestAvailable),
        4 => Ok(AdvanceKind::FlushQueueRequest),
        other => Err(TimeError::InvalidSnapshot(format!(
            "unknown advance kind {other}"
        ))),
    }
}

struct SnapshotReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> SnapshotReader<'a> {
    fn read<P: Pod>(&mut self) -> Result<P, TimeError> {
        let size = std::mem::size_of::<P>();
        let end = self.offset + size;
        let slice = self.bytes.get(self.offset..end).ok_or_else(|| {
            TimeError::InvalidSnapshot(format!(
                "truncated at byte {} (wanted {size} more)",
                self.offset
            ))
        })?;
        let value = try_pod_read_unaligned::<P>(slice)
            .map_err(|err| TimeError::InvalidSnapshot(format!("{err:?}")))?;
        self.offset = end;
        Ok(value)
    }

    fn read_if<P: Pod>(&mut self, flags: u8, bit: u8) -> Result<Option<P>, TimeError> {
        if flags & bit == 0 {
            return Ok(None);
        }
        self.read().map(Some)
    }
}

impl<T: LogicalTime> FederateTimeRecord<T> {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.lookahead.is_some() {
            flags |= HAS_LOOKAHEAD;
        }
        if self.lots.is_some() {
            flags |= HAS_LOTS;
        }
        if self.pending.is_some() {
            flags |= HAS_PENDING;
        }
        if self.galt.is_some() {
            flags |= HAS_GALT;
        }
        if self.reported_lits.is_some() {
            flags |= HAS_REPORTED_LITS;
        }
        if self.delivery_bound.is_some() {
            flags |= HAS_DELIVERY_BOUND;
        }

        let mut bytes = vec![
            SNAPSHOT_VERSION,
            temporal_to_byte(self.temporal_state),
            regulating_to_byte(self.regulating_state),
            constrained_to_byte(self.constrained_state),
            self.pending
                .map(|pending| kind_to_byte(pending.kind))
                .unwrap_or(NO_PENDING),
            flags,
        ];
        bytes.extend_from_slice(bytes_of(&self.federate_time));
        if let Some(lookahead) = &self.lookahead {
            bytes.extend_from_slice(bytes_of(lookahead));
        }
        for time in [
            self.lots,
            self.pending.map(|pending| pending.time),
            self.galt,
            self.reported_lits,
            self.delivery_bound,
        ]
        .iter()
        .flatten()
        {
            bytes.extend_from_slice(bytes_of(time));
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TimeError> {
        if bytes.len() < HEADER_LEN {
            return Err(TimeError::InvalidSnapshot(format!(
                "snapshot of {} bytes is shorter than its header",
                bytes.len()
            )));
        }
        if bytes[0] != SNAPSHOT_VERSION {
            return Err(TimeError::InvalidSnapshot(format!(
                "unsupported snapshot version {}",
                bytes[0]
            )));
        }
        let temporal_state = temporal_from_byte(bytes[1])?;
        let regulating_state = regulating_from_byte(bytes[2])?;
        let constrained_state = constrained_from_byte(bytes[3])?;
        let flags = bytes[5];

        let mut reader = SnapshotReader {
            bytes,
            offset: HEADER_LEN,
        };
        let federate_time: T = reader.read()?;
        let lookahead = reader.read_if::<T::Interval>(flags, HAS_LOOKAHEAD)?;
        let lots = reader.read_if::<T>(flags, HAS_LOTS)?;
        let pending = match reader.read_if::<T>(flags, HAS_PENDING)? {
            Some(time) => Some(PendingRequest::new(time, kind_from_byte(bytes[4])?)),
            None => None,
        };
        let galt = reader.read_if::<T>(flags, HAS_GALT)?;
        let reported_lits = reader.read_if::<T>(flags, HAS_REPORTED_LITS)?;
        let delivery_bound = reader.read_if::<T>(flags, HAS_DELIVERY_BOUND)?;

        if reader.offset != bytes.len() {
            return Err(TimeError::InvalidSnapshot(format!(
                "{} trailing bytes",
                bytes.len() - reader.offset
            )));
        }

        let record = Self {
            temporal_state,
            regulating_state,
            constrained_state,
            federate_time,
            lookahead,
            lots,
            pending,
            galt,
            reported_lits,
            delivery_bound,
        };
        record.validate()?;
        Ok(record)
    }
}
