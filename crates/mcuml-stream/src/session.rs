//! Streaming validation session
//!
//! The host drives the device frame by frame:
//!
//! ```text
//! host                      device
//! ML_START            ──▶
//!                     ◀──  ML_READY
//! ML_MODEL_DATA_REQ   ──▶
//!                     ◀──  ML_MODEL_DATA + RegressionInfo
//! ML_DATASET_SENDREQ  ──▶
//!                     ◀──  ML_READY
//! DatasetHeader       ──▶
//!                     ◀──  ML_FRAME          ┐ per frame
//! frame bytes         ──▶                    │
//!                     ◀──  ML_RESULT + data  ┘ at window ends
//! ML_COMPLETED        ──▶
//!                     ◀──  ML_DONE
//! ```
//!
//! Results go out only at the end of each recurrent window; non-recurrent
//! models answer every frame.

use mcuml_quant::ElemType;
use mcuml_runtime::{MlError, ModelRuntime};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::protocol::{
    data_type_code, DatasetHeader, RegressionInfo, DATASET_HEADER_BYTES, TOKEN_COMPLETED,
    TOKEN_DATASET_SEND_REQ, TOKEN_DONE, TOKEN_ERROR, TOKEN_FRAME, TOKEN_MODEL_DATA,
    TOKEN_MODEL_DATA_REQ, TOKEN_READY, TOKEN_RESULT, TOKEN_START,
};
use crate::transport::Transport;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Deadline for each handshake step.
    pub handshake_timeout_ms: u64,
    /// Floor for per-frame receive deadlines; large frames on slow links
    /// get proportionally more.
    pub frame_timeout_ms: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 60_000,
            frame_timeout_ms: 1_000,
        }
    }
}

fn expect_token<T: Transport>(transport: &mut T, token: &[u8], timeout_ms: u64) -> Result<()> {
    let mut buf = vec![0u8; token.len()];
    transport.receive(&mut buf, timeout_ms)?;
    if buf != token {
        let _ = transport.send(TOKEN_ERROR);
        return Err(StreamError::protocol(format!(
            "expected {}, got {}",
            String::from_utf8_lossy(token),
            String::from_utf8_lossy(&buf)
        )));
    }
    Ok(())
}

fn abort<T: Transport>(transport: &mut T, reason: String) -> StreamError {
    let _ = transport.send(TOKEN_ERROR);
    StreamError::protocol(reason)
}

fn frame_deadline_ms(frame_bytes: usize, baud_rate: u32, floor_ms: u64) -> u64 {
    if baud_rate == 0 {
        return floor_ms;
    }
    // 10 bits per byte on an async link; double for margin.
    let transfer_ms = (frame_bytes as u64 * 10 * 1000 * 2) / u64::from(baud_rate);
    floor_ms.max(transfer_ms)
}

fn handshake<T: Transport, E: ElemType>(
    transport: &mut T,
    model: &ModelRuntime<'_, E>,
    opts: &StreamOptions,
) -> Result<DatasetHeader> {
    expect_token(transport, TOKEN_START, opts.handshake_timeout_ms)?;
    model.log_model_info();
    transport.send(TOKEN_READY)?;

    expect_token(transport, TOKEN_MODEL_DATA_REQ, opts.handshake_timeout_ms)?;
    transport.send(TOKEN_MODEL_DATA)?;
    transport.send(&RegressionInfo::from_model(model).encode())?;

    expect_token(transport, TOKEN_DATASET_SEND_REQ, opts.handshake_timeout_ms)?;
    transport.send(TOKEN_READY)?;

    let mut raw = [0u8; DATASET_HEADER_BYTES];
    transport.receive(&mut raw, opts.handshake_timeout_ms)?;
    DatasetHeader::decode(&raw)
}

fn validate_header<T: Transport, E: ElemType>(
    transport: &mut T,
    model: &ModelRuntime<'_, E>,
    header: &DatasetHeader,
) -> Result<()> {
    if header.data_type != data_type_code::<E>() {
        let _ = transport.send(TOKEN_ERROR);
        return Err(StreamError::Model {
            source: MlError::type_mismatch(format!(
                "dataset element type {} != build type {}",
                header.data_type,
                data_type_code::<E>()
            )),
        });
    }
    if header.frame_elems as usize != model.input_len() {
        return Err(abort(
            transport,
            format!(
                "frame elements {} != model input {}",
                header.frame_elems,
                model.input_len()
            ),
        ));
    }
    if header.frame_bytes as usize != model.input_len() * E::BYTES {
        return Err(abort(
            transport,
            format!("frame bytes {} inconsistent with element width", header.frame_bytes),
        ));
    }
    if header.output_bytes as usize != model.output_len() * E::BYTES {
        return Err(abort(
            transport,
            format!(
                "expected output bytes {} != model output {}",
                header.output_bytes,
                model.output_len() * E::BYTES
            ),
        ));
    }
    Ok(())
}

fn send_result<T: Transport, E: ElemType>(
    transport: &mut T,
    model: &ModelRuntime<'_, E>,
) -> Result<()> {
    transport.send(TOKEN_RESULT)?;
    let output = model.output();
    let mut wire = vec![0u8; output.len() * E::BYTES];
    for (i, v) in output.iter().enumerate() {
        v.write_le(&mut wire[i * E::BYTES..]);
    }
    transport.send(&wire)?;
    if !E::IS_FLOAT {
        // Integer builds append the output's fraction bits so the host can
        // dequantize; affine engines report zero here.
        transport.send(&[model.output_fraction_bits()])?;
    }
    Ok(())
}

/// Run one full validation session over `transport`.
///
/// Blocks until the host completes the dataset or either side fails. On a
/// protocol violation the device sends `ERROR` before returning.
///
/// # Errors
///
/// Returns [`StreamError::Timeout`] / [`StreamError::Comm`] for link
/// problems, [`StreamError::Protocol`] for peer violations, and
/// [`StreamError::Model`] when the dataset's element type does not match
/// the build or inference itself fails.
pub fn run_validation<T: Transport, E: ElemType>(
    transport: &mut T,
    model: &mut ModelRuntime<'_, E>,
    opts: &StreamOptions,
) -> Result<()> {
    let header = handshake(transport, model, opts)?;
    validate_header(transport, model, &header)?;
    debug!(
        frames = header.num_frames,
        frame_elems = header.frame_elems,
        fraction_bits = header.fraction_bits,
        "dataset accepted"
    );

    if model.input_fraction_bits().is_some() && header.fraction_bits >= 0 {
        let bits = match u8::try_from(header.fraction_bits) {
            Ok(bits) => bits,
            Err(_) => {
                let reason = format!("fraction bits {} out of range", header.fraction_bits);
                return Err(abort(transport, reason));
            }
        };
        model.set_input_fraction_bits(bits)?;
    }

    let window = model.recurrent_window();
    if window.is_some() {
        model.reset_state();
    }
    let window = window.unwrap_or(1);

    let frame_bytes = header.frame_bytes as usize;
    let deadline = frame_deadline_ms(frame_bytes, header.baud_rate, opts.frame_timeout_ms);
    let mut raw = vec![0u8; frame_bytes];
    let mut frame = vec![E::default(); model.input_len()];

    for n in 0..header.num_frames as usize {
        transport.send(TOKEN_FRAME)?;
        transport.receive(&mut raw, deadline)?;
        for (i, v) in frame.iter_mut().enumerate() {
            *v = E::read_le(&raw[i * E::BYTES..]);
        }
        model.run(&frame)?;
        if (n + 1) % window == 0 {
            send_result(transport, model)?;
        }
    }

    model.profile_log();
    info!(frames = header.num_frames, "dataset complete");
    expect_token(transport, TOKEN_COMPLETED, opts.handshake_timeout_ms)?;
    transport.send(TOKEN_DONE)?;
    Ok(())
}
