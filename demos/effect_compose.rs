//! Composes shader programs from effect snippets and prints the generated
//! WGSL, using the in-memory backend so no GPU is needed.
//!
//! Run with `RUST_LOG=debug cargo run --example effect_compose`.

use scena::prelude::*;

fn main() {
    env_logger::init();

    let backend = RecordingBackend::new();
    let mut effects = ShaderEffectRegistry::new(backend.clone());

    effects.register(
        EffectKind::new(
            "grayscale",
            "let luma = dot(color.rgb, vec3<f32>(0.299, 0.587, 0.114));\n\
             color = vec4<f32>(mix(color.rgb, vec3<f32>(luma), amount), color.a);",
        )
        .with_param("amount", 1.0),
    );

    effects.register(
        EffectKind::new(
            "scanlines",
            "let line = floor(tex_coord.y / uniforms.texel_size.y);\n\
             if (line % 2.0 < 1.0) {\n\
                 color = vec4<f32>(color.rgb * intensity, color.a);\n\
             }",
        )
        .with_param("intensity", 0.7),
    );

    // Request order differs from canonical order on purpose: both resolve
    // to the same cached program
    let program = effects.shader_for_effects(&["scanlines", "grayscale"]);
    println!("program key: {}", program.key);
    println!("default params: {:?}", program.default_params());

    let again = effects.shader_for_effects(&["grayscale", "scanlines"]).handle;
    assert_eq!(backend.programs().len(), 1);
    println!("second request reused handle {again:?}");

    for record in backend.programs() {
        println!("\n--- {} ---", record.name);
        println!("{}", record.descriptor.module_source());
    }
}
