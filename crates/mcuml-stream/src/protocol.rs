//! Wire protocol: tokens and fixed-size binary structs
//!
//! The host validation tool and the device exchange short ASCII tokens to
//! sequence the session, plus two little-endian structs: the device
//! describes its model with a [`RegressionInfo`], the host describes the
//! dataset it is about to stream with a [`DatasetHeader`].

use bytes::{Buf, BufMut};
use mcuml_quant::ElemType;
use mcuml_runtime::{EngineKind, ModelRuntime, QuantScheme};

use crate::error::{Result, StreamError};

/// Host starts a session.
pub const TOKEN_START: &[u8] = b"ML_START";
/// Device (or host) is ready for the next phase.
pub const TOKEN_READY: &[u8] = b"ML_READY";
/// Host requests the model description.
pub const TOKEN_MODEL_DATA_REQ: &[u8] = b"ML_MODEL_DATA_REQ";
/// Device announces the model description payload.
pub const TOKEN_MODEL_DATA: &[u8] = b"ML_MODEL_DATA";
/// Host asks to send the dataset header.
pub const TOKEN_DATASET_SEND_REQ: &[u8] = b"ML_DATASET_SENDREQ";
/// Device requests the next input frame.
pub const TOKEN_FRAME: &[u8] = b"ML_FRAME";
/// Device announces an inference result payload.
pub const TOKEN_RESULT: &[u8] = b"ML_RESULT";
/// Host signals that the dataset is exhausted.
pub const TOKEN_COMPLETED: &[u8] = b"ML_COMPLETED";
/// Device closes the session.
pub const TOKEN_DONE: &[u8] = b"ML_DONE";
/// Either side aborts.
pub const TOKEN_ERROR: &[u8] = b"ERROR";

/// Wire size of [`RegressionInfo`].
pub const REGRESSION_INFO_BYTES: usize = 28;
/// Wire size of [`DatasetHeader`].
pub const DATASET_HEADER_BYTES: usize = 28;

/// Dataset element type code carried in [`DatasetHeader::data_type`].
pub fn data_type_code<E: ElemType>() -> u32 {
    if E::IS_FLOAT {
        1
    } else if E::BYTES == 1 {
        2
    } else {
        3
    }
}

fn engine_code(kind: EngineKind) -> u32 {
    match kind {
        EngineKind::FixedPoint => 1,
        EngineKind::Interpreter => 2,
        EngineKind::Compiled => 3,
    }
}

/// Model description the device sends during the handshake. The host's
/// regression harness compares device output against its golden reference
/// using these parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionInfo {
    /// Output size in bytes per inference.
    pub output_bytes: u32,
    /// Working-memory bytes the model uses.
    pub buffer_bytes: u32,
    /// Model binary size in bytes.
    pub model_bytes: u32,
    /// Engine family code.
    pub engine_type: u32,
    /// Frames per recurrent window, 0 for non-recurrent models.
    pub recurrent_window: u32,
    /// Output affine zero point, 0 when not affine-quantized.
    pub output_zero_point: i32,
    /// Output affine scale, 0.0 when not affine-quantized.
    pub output_scale: f32,
}

impl RegressionInfo {
    /// Describe a live model object.
    pub fn from_model<E: ElemType>(model: &ModelRuntime<'_, E>) -> Self {
        let (zp, scale) = match model.output_info().quant {
            QuantScheme::Affine { scale, zero_point } => (zero_point, scale),
            _ => (0, 0.0),
        };
        Self {
            output_bytes: (model.output_len() * E::BYTES) as u32,
            buffer_bytes: model.buffer_size() as u32,
            model_bytes: model.model_size() as u32,
            engine_type: engine_code(model.engine()),
            recurrent_window: model.recurrent_window().unwrap_or(0) as u32,
            output_zero_point: zp,
            output_scale: scale,
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REGRESSION_INFO_BYTES);
        buf.put_u32_le(self.output_bytes);
        buf.put_u32_le(self.buffer_bytes);
        buf.put_u32_le(self.model_bytes);
        buf.put_u32_le(self.engine_type);
        buf.put_u32_le(self.recurrent_window);
        buf.put_i32_le(self.output_zero_point);
        buf.put_f32_le(self.output_scale);
        buf
    }

    /// Parse from the wire format.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] when `data` is too short.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < REGRESSION_INFO_BYTES {
            return Err(StreamError::protocol(format!(
                "regression info truncated: {} < {REGRESSION_INFO_BYTES}",
                data.len()
            )));
        }
        let mut b = data;
        Ok(Self {
            output_bytes: b.get_u32_le(),
            buffer_bytes: b.get_u32_le(),
            model_bytes: b.get_u32_le(),
            engine_type: b.get_u32_le(),
            recurrent_window: b.get_u32_le(),
            output_zero_point: b.get_i32_le(),
            output_scale: b.get_f32_le(),
        })
    }
}

/// Dataset description the host sends after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHeader {
    /// Element type code, see [`data_type_code`].
    pub data_type: u32,
    /// Number of frames the host will stream.
    pub num_frames: u32,
    /// Elements per frame.
    pub frame_elems: u32,
    /// Q-format fraction bits of the data, -1 when not applicable.
    pub fraction_bits: i32,
    /// Frame size in bytes.
    pub frame_bytes: u32,
    /// Expected output size in bytes.
    pub output_bytes: u32,
    /// Link speed in bits/s, used to scale receive deadlines.
    pub baud_rate: u32,
}

impl DatasetHeader {
    /// Serialize to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DATASET_HEADER_BYTES);
        buf.put_u32_le(self.data_type);
        buf.put_u32_le(self.num_frames);
        buf.put_u32_le(self.frame_elems);
        buf.put_i32_le(self.fraction_bits);
        buf.put_u32_le(self.frame_bytes);
        buf.put_u32_le(self.output_bytes);
        buf.put_u32_le(self.baud_rate);
        buf
    }

    /// Parse from the wire format.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Protocol`] when `data` is too short.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DATASET_HEADER_BYTES {
            return Err(StreamError::protocol(format!(
                "dataset header truncated: {} < {DATASET_HEADER_BYTES}",
                data.len()
            )));
        }
        let mut b = data;
        Ok(Self {
            data_type: b.get_u32_le(),
            num_frames: b.get_u32_le(),
            frame_elems: b.get_u32_le(),
            fraction_bits: b.get_i32_le(),
            frame_bytes: b.get_u32_le(),
            output_bytes: b.get_u32_le(),
            baud_rate: b.get_u32_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_info_roundtrip() {
        let info = RegressionInfo {
            output_bytes: 8,
            buffer_bytes: 1024,
            model_bytes: 4096,
            engine_type: 1,
            recurrent_window: 5,
            output_zero_point: -3,
            output_scale: 0.25,
        };
        let wire = info.encode();
        assert_eq!(wire.len(), REGRESSION_INFO_BYTES);
        assert_eq!(RegressionInfo::decode(&wire).unwrap(), info);
    }

    #[test]
    fn dataset_header_roundtrip() {
        let hdr = DatasetHeader {
            data_type: 2,
            num_frames: 100,
            frame_elems: 64,
            fraction_bits: 7,
            frame_bytes: 64,
            output_bytes: 4,
            baud_rate: 115_200,
        };
        let wire = hdr.encode();
        assert_eq!(wire.len(), DATASET_HEADER_BYTES);
        assert_eq!(DatasetHeader::decode(&wire).unwrap(), hdr);
    }

    #[test]
    fn truncated_structs_rejected() {
        assert!(RegressionInfo::decode(&[0u8; 10]).is_err());
        assert!(DatasetHeader::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn data_type_codes() {
        assert_eq!(data_type_code::<f32>(), 1);
        assert_eq!(data_type_code::<i8>(), 2);
        assert_eq!(data_type_code::<i16>(), 3);
    }
}
