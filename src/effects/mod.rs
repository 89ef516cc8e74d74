//! Shader effect registration and program composition cache.
//!
//! Effects are small fragment snippets registered by name. Sprites reference
//! a list of effect names; the registry composes one program per distinct
//! effect set, caching by a canonical key so `["blur", "glow"]` and
//! `["glow", "blur"]` share a compile.

mod compose;

pub use compose::{canonical_key, BASE_KEY, MAX_EFFECT_PARAMS};

use std::collections::HashMap;

use crate::gpu::{ProgramHandle, ShaderCompiler, UniformLocation, UniformType, UniformValue};

use compose::compose;

/// A scalar parameter an effect declares, delivered through the shared
/// `effect_params` vector.
#[derive(Clone, Debug)]
pub struct EffectParam {
    pub name: String,
    pub default: f32,
}

/// A custom uniform an effect declares, merged into the composed program's
/// uniform struct.
#[derive(Clone, Debug)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

/// A named fragment snippet plus its declared parameters and uniforms.
#[derive(Clone, Debug)]
pub struct EffectKind {
    name: String,
    fragment_snippet: String,
    params: Vec<EffectParam>,
    uniforms: Vec<UniformDecl>,
}

impl EffectKind {
    pub fn new(name: impl Into<String>, fragment_snippet: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment_snippet: fragment_snippet.into(),
            params: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    /// Declare a scalar parameter with its default value.
    pub fn with_param(mut self, name: impl Into<String>, default: f32) -> Self {
        self.params.push(EffectParam {
            name: name.into(),
            default,
        });
        self
    }

    /// Declare a custom `f32` uniform.
    pub fn with_uniform(mut self, name: impl Into<String>) -> Self {
        self.with_typed_uniform(name, UniformType::Float)
    }

    pub fn with_typed_uniform(mut self, name: impl Into<String>, ty: UniformType) -> Self {
        self.uniforms.push(UniformDecl {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[EffectParam] {
        &self.params
    }

    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }
}

/// Where one effect parameter landed in the shared `effect_params` vector.
#[derive(Clone, Debug)]
pub struct ParamSlot {
    pub effect: String,
    pub param: String,
    /// Component index into `effect_params` (0 = x .. 3 = w).
    pub component: usize,
    pub default: f32,
}

/// A compiled program for one canonical effect set.
#[derive(Clone, Debug)]
pub struct ComposedProgram {
    pub key: String,
    pub handle: ProgramHandle,
    /// Effect names in canonical order.
    pub effects: Vec<String>,
    pub param_slots: Vec<ParamSlot>,
    uniform_locations: HashMap<String, UniformLocation>,
}

impl ComposedProgram {
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_locations.get(name).copied()
    }

    /// The `effect_params` vector with every slot at its declared default.
    pub fn default_params(&self) -> [f32; 4] {
        let mut params = [0.0; 4];
        for slot in &self.param_slots {
            params[slot.component] = slot.default;
        }
        params
    }

    /// Defaults with per-sprite `(effect, param, value)` overrides applied.
    pub fn params_with(&self, overrides: &[(&str, &str, f32)]) -> [f32; 4] {
        let mut params = self.default_params();
        for (effect, param, value) in overrides {
            match self
                .param_slots
                .iter()
                .find(|s| s.effect == *effect && s.param == *param)
            {
                Some(slot) => params[slot.component] = *value,
                None => log::warn!("no parameter slot for '{effect}.{param}'"),
            }
        }
        params
    }
}

/// Owns the effect kinds, the composed-program cache, and the pending
/// uniform values for the current frame.
pub struct ShaderEffectRegistry<C: ShaderCompiler> {
    compiler: C,
    effects: Vec<EffectKind>,
    programs: HashMap<String, ComposedProgram>,
    uniforms: HashMap<String, UniformValue>,
}

impl<C: ShaderCompiler> ShaderEffectRegistry<C> {
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            effects: Vec::new(),
            programs: HashMap::new(),
            uniforms: HashMap::new(),
        }
    }

    /// Register an effect kind, replacing any previous definition with the
    /// same name. Cached programs using the effect are dropped so the next
    /// request recompiles with the new definition.
    pub fn register(&mut self, kind: EffectKind) {
        let name = kind.name.clone();
        match self.effects.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = kind,
            None => self.effects.push(kind),
        }
        let before = self.programs.len();
        self.programs
            .retain(|_, program| !program.effects.iter().any(|e| *e == name));
        if self.programs.len() != before {
            log::debug!(
                "effect '{name}' redefined, dropped {} cached program(s)",
                before - self.programs.len()
            );
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.effects.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&EffectKind> {
        self.effects.iter().find(|e| e.name == name)
    }

    /// The compiled program for an effect set, compiling on first request.
    ///
    /// Unknown names are skipped with a warning; the empty set yields the
    /// plain textured program under [`BASE_KEY`].
    pub fn shader_for_effects(&mut self, names: &[&str]) -> &ComposedProgram {
        let key = canonical_key(names);
        if !self.programs.contains_key(&key) {
            let program = self.compose_program(&key, names);
            self.programs.insert(key.clone(), program);
        }
        &self.programs[&key]
    }

    fn compose_program(&mut self, key: &str, names: &[&str]) -> ComposedProgram {
        let mut canonical: Vec<&str> = names.to_vec();
        canonical.sort_unstable();
        canonical.dedup();

        let mut resolved: Vec<&EffectKind> = Vec::new();
        for name in &canonical {
            match self.effects.iter().find(|e| e.name == *name) {
                Some(effect) => resolved.push(effect),
                None => log::warn!("unknown effect '{name}' skipped during shader composition"),
            }
        }
        // Blocks run in registration order regardless of the canonical key.
        let mut ordered = resolved.clone();
        ordered.sort_by_key(|effect| {
            self.effects
                .iter()
                .position(|e| e.name == effect.name)
                .unwrap_or(usize::MAX)
        });

        let composition = compose(&resolved, &ordered);
        let effect_names: Vec<String> = resolved.iter().map(|e| e.name.clone()).collect();

        let program_name = format!("effects:{key}");
        let compiled = self.compiler.register(&program_name, &composition.descriptor);
        log::debug!(
            "composed shader program '{program_name}' with {} uniform(s)",
            composition.descriptor.uniforms.len()
        );

        ComposedProgram {
            key: key.to_string(),
            handle: compiled.handle,
            effects: effect_names,
            param_slots: composition.param_slots,
            uniform_locations: compiled.uniform_locations,
        }
    }

    /// Look up a cached program without composing.
    pub fn program(&self, key: &str) -> Option<&ComposedProgram> {
        self.programs.get(key)
    }

    /// Stage a uniform value for the next [`apply_uniforms`] call.
    ///
    /// [`apply_uniforms`]: Self::apply_uniforms
    pub fn set_uniform(&mut self, name: impl Into<String>, value: UniformValue) {
        self.uniforms.insert(name.into(), value);
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Write every staged uniform the program declares; names the program
    /// does not declare are skipped.
    pub fn apply_uniforms(&mut self, key: &str) {
        let Some(program) = self.programs.get(key) else {
            log::warn!("apply_uniforms: no composed program for key '{key}'");
            return;
        };
        for (name, value) in &self.uniforms {
            if let Some(location) = program.uniform_locations.get(name) {
                self.compiler.set_uniform(program.handle, *location, value);
            }
        }
    }

    /// Drop all effects, cached programs, and staged uniforms.
    pub fn dispose(&mut self) {
        self.effects.clear();
        self.programs.clear();
        self.uniforms.clear();
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut C {
        &mut self.compiler
    }
}
