//! WGSL program composition from effect snippets.
//!
//! Builds a single shader module for an arbitrary combination of effects:
//! a fixed vertex stage, a uniform struct holding the base uniforms plus the
//! merged custom uniforms of every effect, and a fragment stage that runs
//! each effect's snippet as a block against a working `color`/`tex_coord`.
//! Output is deterministic for a given effect set and registration order.

use crate::gpu::{ProgramDescriptor, UniformBinding, UniformLocation, UniformType};

use super::{EffectKind, ParamSlot};

/// Hard cap on scalar effect parameters across all composed effects: one
/// `vec4` carries them.
pub const MAX_EFFECT_PARAMS: usize = 4;

const PARAM_COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];

/// Cache key reserved for the effect-free program.
pub const BASE_KEY: &str = "base";

/// Canonicalize an effect-name set: sorted and deduplicated, so combination
/// order never affects the cache key. The empty set maps to [`BASE_KEY`].
pub fn canonical_key(names: &[&str]) -> String {
    let mut sorted: Vec<&str> = names.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.is_empty() {
        BASE_KEY.to_string()
    } else {
        sorted.join("+")
    }
}

pub(crate) struct Composition {
    pub descriptor: ProgramDescriptor,
    pub param_slots: Vec<ParamSlot>,
}

fn align_up(offset: u32, align: u32) -> u32 {
    offset.div_ceil(align) * align
}

/// Compose one program.
///
/// `canonical` drives parameter slot allocation (so equal sets always pack
/// identically); `ordered` is the same set in registry registration order
/// and drives block emission and uniform merging.
pub(crate) fn compose(canonical: &[&EffectKind], ordered: &[&EffectKind]) -> Composition {
    // Allocate declared parameters into the shared vec4, canonical order.
    let mut param_slots = Vec::new();
    let mut next_slot = 0usize;
    for effect in canonical {
        for param in &effect.params {
            if next_slot < MAX_EFFECT_PARAMS {
                param_slots.push(ParamSlot {
                    effect: effect.name.clone(),
                    param: param.name.clone(),
                    component: next_slot,
                    default: param.default,
                });
                next_slot += 1;
            } else {
                log::warn!(
                    "effect '{}' parameter '{}' exceeds the {}-component parameter budget; it will read 0.0",
                    effect.name,
                    param.name,
                    MAX_EFFECT_PARAMS
                );
            }
        }
    }

    // Base uniforms, then merged custom uniforms with WGSL layout rules.
    let mut uniforms = vec![
        UniformBinding {
            name: "screen_size".to_string(),
            ty: UniformType::Vec2,
            location: UniformLocation(0),
        },
        UniformBinding {
            name: "texel_size".to_string(),
            ty: UniformType::Vec2,
            location: UniformLocation(8),
        },
        UniformBinding {
            name: "tint".to_string(),
            ty: UniformType::Vec4,
            location: UniformLocation(16),
        },
        UniformBinding {
            name: "effect_params".to_string(),
            ty: UniformType::Vec4,
            location: UniformLocation(32),
        },
    ];
    let mut next_offset = 48u32;
    for effect in ordered {
        for decl in &effect.uniforms {
            if let Some(existing) = uniforms.iter().find(|u| u.name == decl.name) {
                if existing.ty != decl.ty {
                    log::warn!(
                        "effect '{}' redeclares uniform '{}' as {:?}; keeping {:?}",
                        effect.name,
                        decl.name,
                        decl.ty,
                        existing.ty
                    );
                }
                continue;
            }
            let offset = align_up(next_offset, decl.ty.align());
            uniforms.push(UniformBinding {
                name: decl.name.clone(),
                ty: decl.ty,
                location: UniformLocation(offset),
            });
            next_offset = offset + decl.ty.size();
        }
    }
    let uniform_buffer_size = align_up(next_offset, 16);

    let vertex_source = vertex_source(&uniforms);
    let fragment_source = fragment_source(ordered, &param_slots);

    Composition {
        descriptor: ProgramDescriptor {
            vertex_source,
            fragment_source,
            uniforms,
            uniform_buffer_size,
        },
        param_slots,
    }
}

/// Shared declarations plus the fixed vertex stage (world space → NDC).
fn vertex_source(uniforms: &[UniformBinding]) -> String {
    let mut out = String::from("struct Uniforms {\n");
    for uniform in uniforms {
        out.push_str(&format!("    {}: {},\n", uniform.name, uniform.ty.wgsl()));
    }
    out.push_str("}\n\n");

    out.push_str(
        "@group(0) @binding(0) var t_color: texture_2d<f32>;\n\
         @group(0) @binding(1) var s_color: sampler;\n\
         @group(0) @binding(2) var<uniform> uniforms: Uniforms;\n\n\
         struct VertexOutput {\n\
         \x20   @builtin(position) clip_position: vec4<f32>,\n\
         \x20   @location(0) uv: vec2<f32>,\n\
         \x20   @location(1) opacity: f32,\n\
         }\n\n\
         @vertex\n\
         fn vs_main(\n\
         \x20   @location(0) position: vec2<f32>,\n\
         \x20   @location(1) uv: vec2<f32>,\n\
         \x20   @location(2) opacity: f32,\n\
         ) -> VertexOutput {\n\
         \x20   var out: VertexOutput;\n\
         \x20   let ndc = vec2<f32>(\n\
         \x20       position.x / uniforms.screen_size.x * 2.0 - 1.0,\n\
         \x20       1.0 - position.y / uniforms.screen_size.y * 2.0,\n\
         \x20   );\n\
         \x20   out.clip_position = vec4<f32>(ndc, 0.0, 1.0);\n\
         \x20   out.uv = uv;\n\
         \x20   out.opacity = opacity;\n\
         \x20   return out;\n\
         }\n",
    );
    out
}

/// The fragment stage: sample, run effect blocks, tint, alpha-weight.
fn fragment_source(ordered: &[&EffectKind], param_slots: &[ParamSlot]) -> String {
    let mut out = String::from(
        "@fragment\n\
         fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n\
         \x20   var tex_coord = in.uv;\n\
         \x20   var color = textureSample(t_color, s_color, tex_coord);\n",
    );

    for effect in ordered {
        out.push_str(&format!("\n    // effect: {}\n    {{\n", effect.name));
        for param in &effect.params {
            let slot = param_slots
                .iter()
                .find(|s| s.effect == effect.name && s.param == param.name);
            match slot {
                Some(slot) => out.push_str(&format!(
                    "        let {} = uniforms.effect_params.{};\n",
                    param.name, PARAM_COMPONENTS[slot.component]
                )),
                // Dropped by the parameter budget: reads zero.
                None => out.push_str(&format!("        let {} = 0.0;\n", param.name)),
            }
        }
        for line in effect.fragment_snippet.lines() {
            out.push_str("        ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("    }\n");
    }

    out.push_str(
        "\n    color = vec4<f32>(color.rgb * uniforms.tint.rgb, color.a * uniforms.tint.a);\n\
         \x20   return vec4<f32>(color.rgb, color.a * in.opacity);\n\
         }\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectKind;

    #[test]
    fn test_canonical_key_sorts_and_dedups() {
        assert_eq!(canonical_key(&["b", "a", "b"]), "a+b");
        assert_eq!(canonical_key(&["a", "b"]), canonical_key(&["b", "a"]));
        assert_eq!(canonical_key(&[]), "base");
    }

    #[test]
    fn test_base_program_has_no_effect_blocks() {
        let composition = compose(&[], &[]);
        assert!(!composition.descriptor.fragment_source.contains("// effect:"));
        assert!(composition.param_slots.is_empty());
        assert_eq!(composition.descriptor.uniform_buffer_size, 48);
    }

    #[test]
    fn test_base_uniform_layout() {
        let composition = compose(&[], &[]);
        let uniforms = &composition.descriptor.uniforms;
        let offsets: Vec<(&str, u32)> = uniforms
            .iter()
            .map(|u| (u.name.as_str(), u.location.0))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("screen_size", 0),
                ("texel_size", 8),
                ("tint", 16),
                ("effect_params", 32),
            ]
        );
    }

    #[test]
    fn test_custom_uniform_offsets_respect_alignment() {
        let a = EffectKind::new("a", "color.r = color.r;")
            .with_uniform("u_time")
            .with_typed_uniform("u_dir", UniformType::Vec2);
        let composition = compose(&[&a], &[&a]);
        let uniforms = &composition.descriptor.uniforms;

        let time = uniforms.iter().find(|u| u.name == "u_time").unwrap();
        assert_eq!(time.ty, UniformType::Float);
        assert_eq!(time.location.0, 48);

        // vec2 aligns to 8: 52 rounds up to 56
        let dir = uniforms.iter().find(|u| u.name == "u_dir").unwrap();
        assert_eq!(dir.location.0, 56);
        assert_eq!(composition.descriptor.uniform_buffer_size, 64);
    }

    #[test]
    fn test_uniform_merge_dedups_across_effects() {
        let a = EffectKind::new("a", "").with_uniform("u_time");
        let b = EffectKind::new("b", "").with_uniform("u_time");
        let composition = compose(&[&a, &b], &[&a, &b]);
        let count = composition
            .descriptor
            .uniforms
            .iter()
            .filter(|u| u.name == "u_time")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_snippet_spliced_verbatim_with_param_bindings() {
        let glow = EffectKind::new("glow", "color = color * (1.0 + strength);")
            .with_param("strength", 0.5);
        let composition = compose(&[&glow], &[&glow]);
        let source = &composition.descriptor.fragment_source;
        assert!(source.contains("// effect: glow"));
        assert!(source.contains("let strength = uniforms.effect_params.x;"));
        assert!(source.contains("color = color * (1.0 + strength);"));
    }

    #[test]
    fn test_param_overflow_dropped_reads_zero() {
        let fat = EffectKind::new("fat", "color.a = a + b + c + d + e;")
            .with_param("a", 0.0)
            .with_param("b", 0.0)
            .with_param("c", 0.0)
            .with_param("d", 0.0)
            .with_param("e", 0.0);
        let composition = compose(&[&fat], &[&fat]);

        assert_eq!(composition.param_slots.len(), 4);
        let source = &composition.descriptor.fragment_source;
        assert!(source.contains("let a = uniforms.effect_params.x;"));
        assert!(source.contains("let b = uniforms.effect_params.y;"));
        assert!(source.contains("let c = uniforms.effect_params.z;"));
        assert!(source.contains("let d = uniforms.effect_params.w;"));
        assert!(source.contains("let e = 0.0;"));
    }

    #[test]
    fn test_params_pack_across_effects_in_canonical_order() {
        let a = EffectKind::new("a", "").with_param("first", 0.0).with_param("second", 0.0);
        let b = EffectKind::new("b", "").with_param("third", 0.0);
        // Canonical order decides packing even if registration order differs
        let composition = compose(&[&a, &b], &[&b, &a]);
        let slots: Vec<(String, usize)> = composition
            .param_slots
            .iter()
            .map(|s| (format!("{}.{}", s.effect, s.param), s.component))
            .collect();
        assert_eq!(
            slots,
            vec![
                ("a.first".to_string(), 0),
                ("a.second".to_string(), 1),
                ("b.third".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_blocks_emitted_in_registration_order() {
        let a = EffectKind::new("a", "");
        let b = EffectKind::new("b", "");
        // b registered before a
        let composition = compose(&[&a, &b], &[&b, &a]);
        let source = &composition.descriptor.fragment_source;
        let b_at = source.find("// effect: b").unwrap();
        let a_at = source.find("// effect: a").unwrap();
        assert!(b_at < a_at);
    }
}
