//! Example: full model lifecycle with profiling
//!
//! Builds a small fixed-point model blob, initializes a runtime object,
//! streams a few frames through it, and prints the profile.

use mcuml_runtime::backends::pack_fixedpoint_model;
use mcuml_runtime::prelude::*;
use mcuml_runtime::ProfileConfig;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("MCU ML runtime demo\n");

    // Step 1: Pack a demo model (4 inputs, 8 hidden, 2 outputs, window 4)
    println!("1. Packing model blobs...");
    let w_in = vec![0.2f32; 8 * 4];
    let w_rec = vec![0.05f32; 8 * 8];
    let w_out = vec![0.125f32; 2 * 8];
    let (params, weights) = pack_fixedpoint_model(4, 8, 2, 4, 0, &w_in, &w_rec, &w_out);
    println!("   params {} bytes, weights {} bytes\n", params.len(), weights.len());

    // Step 2: Context and model object
    println!("2. Initializing model...");
    let ctx = MlContext::new(100_000_000).build();
    let mut model: ModelRuntime<'_, f32> = ModelRuntime::init(
        "demo_rnn",
        ModelBinary::FixedPoint {
            params: &params,
            weights: &weights,
        },
        ModelBuffers::allocate_all(),
        ctx,
    )?;
    model.log_model_info();
    println!(
        "   input {} elements, output {} elements, window {:?}\n",
        model.input_len(),
        model.output_len(),
        model.recurrent_window()
    );

    // Step 3: Stream one recurrent window of frames
    println!("3. Running inference...");
    model.profile_config(ProfileConfig::MODEL);
    model.reset_state();
    let mut last = Vec::new();
    for t in 0..4 {
        let frame = [0.1 * (t + 1) as f32; 4];
        last = model.run(&frame)?.to_vec();
    }
    println!("   window output: {last:?}\n");

    // Step 4: Profile summary
    println!("4. Profile:");
    model.profile_log();
    let p = model.profiler();
    println!(
        "   {} frames, cpu avg {} cycles, peak {} (frame {})",
        p.frames(),
        p.cpu().average(p.frames()),
        p.cpu().peak,
        p.cpu().peak_frame
    );

    println!("\nDone.");
    Ok(())
}
