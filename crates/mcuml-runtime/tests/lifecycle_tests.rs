//! End-to-end lifecycle tests across engine backends.

use std::sync::Arc;

use mcuml_runtime::backends::{pack_fixedpoint_model, pack_interpreter_model};
use mcuml_runtime::prelude::*;
use mcuml_runtime::ProfileConfig;

fn ctx() -> Arc<MlContext> {
    MlContext::new(100_000_000).build()
}

fn forward_model(input: usize, hidden: usize, output: usize) -> (Vec<u8>, Vec<u8>) {
    let w_in = vec![1.0f32 / input as f32; hidden * input];
    let w_out = vec![1.0f32 / hidden as f32; output * hidden];
    pack_fixedpoint_model(input, hidden, output, 0, 0, &w_in, &[], &w_out)
}

#[test]
fn float32_four_in_two_out() {
    let (params, weights) = forward_model(4, 8, 2);
    let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
        "sensor_head",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();

    assert_eq!(model.input_len(), 4);
    assert_eq!(model.output_len(), 2);
    assert_eq!(model.engine(), EngineKind::FixedPoint);

    let out = model.run(&[0.4, 0.4, 0.4, 0.4]).unwrap();
    // Mean input 0.4 → hidden tanh(0.4) → mean readout.
    let expected = 0.4f32.tanh();
    for v in out {
        assert!((v - expected).abs() < 1e-5);
    }
}

#[test]
fn recurrent_sequence_control() {
    let input = 2;
    let hidden = 4;
    let w_in = vec![0.5f32; hidden * input];
    let w_rec = vec![0.2f32; hidden * hidden];
    let w_out = vec![0.25f32; hidden];
    let (params, weights) = pack_fixedpoint_model(input, hidden, 1, 5, 0, &w_in, &w_rec, &w_out);

    let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
        "rnn_window5",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();
    assert_eq!(model.recurrent_window(), Some(5));

    // State accumulates across frames and only reset_state clears it.
    let frame = [0.3f32, 0.3];
    let first = model.run(&frame).unwrap()[0];
    let second = model.run(&frame).unwrap()[0];
    assert!((first - second).abs() > 1e-7);

    model.reset_state();
    let replay = model.run(&frame).unwrap()[0];
    assert!((replay - first).abs() < 1e-6);
}

#[test]
fn borrowed_buffers_survive_the_model() {
    let w_in = vec![0.5f32; 4 * 2];
    let w_rec = vec![0.1f32; 16];
    let w_out = vec![0.25f32; 4];
    let (params, weights) = pack_fixedpoint_model(2, 4, 1, 3, 0, &w_in, &w_rec, &w_out);

    let mut persistent = [0u8; 16];
    let mut scratch = [0u8; 16];
    {
        let buffers = ModelBuffers {
            persistent: Some(&mut persistent),
            scratch: Some(&mut scratch),
            ..ModelBuffers::default()
        };
        let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
            "static_buffers",
            ModelBinary::FixedPoint {
                params: &params,
                weights: &weights,
            },
            buffers,
            ctx(),
        )
        .unwrap();
        model.run(&[1.0, 1.0]).unwrap();
    }
    // The model is gone; the caller's memory is intact and holds state.
    assert!(persistent.iter().any(|&b| b != 0));
}

#[test]
fn interpreter_arena_too_small_fails_atomically() {
    let mut weights = vec![0f32; 64 * 64];
    for i in 0..64 {
        weights[i * 64 + i] = 1.0;
    }
    let blob = pack_interpreter_model(16, &[64], 1, 64, 0, 1.0, &weights);
    let err = ModelRuntime::<f32>::init(
        "too_big",
        ModelBinary::Interpreter { model: &blob },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap_err();
    assert!(matches!(err, MlError::BadModel { .. }));
}

#[test]
fn interpreter_end_to_end_int8() {
    // Identity over 3 elements, affine scale 0.1 zp 10.
    let mut weights = vec![0f32; 9];
    for i in 0..3 {
        weights[i * 3 + i] = 1.0;
    }
    let blob = pack_interpreter_model(256, &[3], 1, 3, 10, 0.1, &weights);
    let mut model: ModelRuntime<'_, i8> = ModelRuntime::init(
        "affine_identity",
        ModelBinary::Interpreter { model: &blob },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();

    let floats = [1.0f32, -0.5, 0.0];
    let mut stored = [0i8; 3];
    model.quantize_input(&floats, &mut stored).unwrap();
    assert_eq!(stored, [20, 5, 10]);

    model.run(&stored).unwrap();
    let mut back = [0f32; 3];
    model.dequantize_output(&mut back).unwrap();
    for (a, b) in floats.iter().zip(back.iter()) {
        assert!((a - b).abs() <= 0.1, "{a} vs {b}");
    }
}

#[test]
fn q_format_control_is_engine_gated() {
    let (params, weights) = forward_model(4, 4, 1);
    let mut fixed: ModelRuntime<'_, f32> = ModelRuntime::init(
        "float_engine",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();
    // Float builds have no fraction bits anywhere.
    assert!(fixed.input_fraction_bits().is_none());
    assert!(fixed.set_input_fraction_bits(4).is_err());
    assert_eq!(fixed.output_fraction_bits(), 0);

    let weights_i = vec![1.0f32; 4];
    let blob = pack_interpreter_model(256, &[4], 1, 1, 0, 0.05, &weights_i);
    let mut interp: ModelRuntime<'_, i8> = ModelRuntime::init(
        "affine_engine",
        ModelBinary::Interpreter { model: &blob },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();
    // Affine engines reject Q-format control too.
    assert!(interp.set_input_fraction_bits(4).is_err());
}

#[test]
fn failed_inference_leaves_model_usable() {
    // Weights blown up to overflow f32 into infinity.
    let w_in = vec![f32::MAX; 2 * 2];
    let w_out = vec![f32::MAX; 2];
    let (params, weights) = pack_fixedpoint_model(2, 2, 1, 0, 0, &w_in, &[], &w_out);
    let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
        "overflow",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();

    let err = model.run(&[f32::MAX, f32::MAX]).unwrap_err();
    assert!(matches!(err, MlError::Inference { code } if code != 0));
    assert_ne!(model.backend().last_engine_code(), 0);

    // The object is still valid for well-behaved inputs.
    model.run(&[0.0, 0.0]).unwrap();
}

#[test]
fn output_log_mode_runs_clean() {
    let (params, weights) = forward_model(4, 4, 2);
    let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
        "logged",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx(),
    )
    .unwrap();
    model.profile_config(ProfileConfig::OUTPUT_LOG);
    model.run(&[0.1; 4]).unwrap();
    assert_eq!(model.profiler().frames(), 0);
}
