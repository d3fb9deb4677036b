//! Shader interface reflection and the pipeline checks built on it.
//!
//! Reflection goes through [`ShaderReflector`] so tests and embedders can
//! supply their own; [`NagaReflector`] parses SPIR-V with naga.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use vkguard_api::vulkan_commands::{ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, PipelineShaderStageCreateInfo};
use vkguard_api::{EntryPoint, Handle, ObjectType};
use vkguard_core::{Diagnostic, ErrorKind, ReflectError, Severity};

use crate::core_validation::state::{Objects, PipelineLayoutState};

pub trait ShaderReflector: Send + Sync {
    fn reflect(&self, code: &[u32]) -> Result<ShaderReflection, ReflectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn from_vk(flags: vk::ShaderStageFlags) -> Option<Self> {
        Some(match flags {
            vk::ShaderStageFlags::VERTEX => ShaderStage::Vertex,
            vk::ShaderStageFlags::TESSELLATION_CONTROL => ShaderStage::TessellationControl,
            vk::ShaderStageFlags::TESSELLATION_EVALUATION => ShaderStage::TessellationEvaluation,
            vk::ShaderStageFlags::GEOMETRY => ShaderStage::Geometry,
            vk::ShaderStageFlags::FRAGMENT => ShaderStage::Fragment,
            vk::ShaderStageFlags::COMPUTE => ShaderStage::Compute,
            _ => return None,
        })
    }

    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::TessellationEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
    Bool,
}

/// A `Location`-decorated stage input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceVariable {
    pub location: u32,
    pub kind: ScalarKind,
    pub components: u32,
}

impl InterfaceVariable {
    pub fn new(location: u32, kind: ScalarKind, components: u32) -> Self {
        Self {
            location,
            kind,
            components,
        }
    }
}

impl fmt::Display for InterfaceVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}x{}", self.kind, self.components)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

impl ResourceClass {
    /// Whether a layout binding of `descriptor_type` can back this resource.
    pub fn accepts(self, descriptor_type: vk::DescriptorType) -> bool {
        use vk::DescriptorType as D;
        match self {
            ResourceClass::UniformBuffer => matches!(
                descriptor_type,
                D::UNIFORM_BUFFER | D::UNIFORM_BUFFER_DYNAMIC | D::INLINE_UNIFORM_BLOCK
            ),
            ResourceClass::StorageBuffer => matches!(descriptor_type, D::STORAGE_BUFFER | D::STORAGE_BUFFER_DYNAMIC),
            ResourceClass::SampledImage => matches!(
                descriptor_type,
                D::SAMPLED_IMAGE | D::COMBINED_IMAGE_SAMPLER | D::UNIFORM_TEXEL_BUFFER | D::INPUT_ATTACHMENT
            ),
            ResourceClass::StorageImage => matches!(descriptor_type, D::STORAGE_IMAGE | D::STORAGE_TEXEL_BUFFER),
            ResourceClass::Sampler => matches!(descriptor_type, D::SAMPLER | D::COMBINED_IMAGE_SAMPLER),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBinding {
    pub set: u32,
    pub binding: u32,
    pub class: ResourceClass,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryPointReflection {
    pub name: String,
    pub stage: ShaderStage,
    pub inputs: Vec<InterfaceVariable>,
    pub outputs: Vec<InterfaceVariable>,
    /// Descriptor-backed resources statically used by the entry point.
    pub resources: Vec<ResourceBinding>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    pub entry_points: Vec<EntryPointReflection>,
}

impl ShaderReflection {
    pub fn entry_point(&self, name: &str, stage: ShaderStage) -> Option<&EntryPointReflection> {
        self.entry_points
            .iter()
            .find(|ep| ep.name == name && ep.stage == stage)
    }
}

/// View shader module bytes as SPIR-V words.
pub fn words_from_bytes(code: &[u8]) -> Result<Vec<u32>, ReflectError> {
    if code.len() % 4 != 0 {
        return Err(ReflectError::Misaligned(code.len()));
    }
    Ok(code.chunks_exact(4).map(bytemuck::pod_read_unaligned).collect())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NagaReflector;

impl ShaderReflector for NagaReflector {
    fn reflect(&self, code: &[u32]) -> Result<ShaderReflection, ReflectError> {
        let options = naga::front::spv::Options::default();
        let module = naga::front::spv::parse_u8_slice(bytemuck::cast_slice(code), &options)
            .map_err(|e| ReflectError::Parse(e.to_string()))?;
        Ok(reflect_module(&module))
    }
}

fn reflect_module(module: &naga::Module) -> ShaderReflection {
    let mut helper_globals = HashSet::new();
    for (_, function) in module.functions.iter() {
        globals_used(function, &mut helper_globals);
    }

    let entry_points = module
        .entry_points
        .iter()
        .filter_map(|ep| {
            let stage = match ep.stage {
                naga::ShaderStage::Vertex => ShaderStage::Vertex,
                naga::ShaderStage::Fragment => ShaderStage::Fragment,
                naga::ShaderStage::Compute => ShaderStage::Compute,
                _ => return None,
            };

            let mut inputs = Vec::new();
            for arg in &ep.function.arguments {
                collect_locations(module, arg.ty, arg.binding.as_ref(), &mut inputs);
            }
            let mut outputs = Vec::new();
            if let Some(result) = &ep.function.result {
                collect_locations(module, result.ty, result.binding.as_ref(), &mut outputs);
            }

            let mut used = helper_globals.clone();
            globals_used(&ep.function, &mut used);
            let mut resources: Vec<ResourceBinding> = used
                .into_iter()
                .filter_map(|global| resource_binding(module, global))
                .collect();
            resources.sort_by_key(|r| (r.set, r.binding));

            Some(EntryPointReflection {
                name: ep.name.clone(),
                stage,
                inputs,
                outputs,
                resources,
            })
        })
        .collect();

    ShaderReflection { entry_points }
}

fn globals_used(function: &naga::Function, out: &mut HashSet<naga::Handle<naga::GlobalVariable>>) {
    for (_, expr) in function.expressions.iter() {
        if let naga::Expression::GlobalVariable(global) = *expr {
            out.insert(global);
        }
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<InterfaceVariable>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            if let Some((kind, components)) = scalar_shape(&module.types[ty].inner) {
                out.push(InterfaceVariable::new(*location, kind, components));
            }
        }
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
        Some(_) => {}
    }
}

fn scalar_shape(inner: &naga::TypeInner) -> Option<(ScalarKind, u32)> {
    match *inner {
        naga::TypeInner::Scalar(scalar) => Some((scalar_kind(scalar.kind)?, 1)),
        naga::TypeInner::Vector { size, scalar } => Some((scalar_kind(scalar.kind)?, size as u32)),
        _ => None,
    }
}

fn scalar_kind(kind: naga::ScalarKind) -> Option<ScalarKind> {
    match kind {
        naga::ScalarKind::Float => Some(ScalarKind::Float),
        naga::ScalarKind::Sint => Some(ScalarKind::Sint),
        naga::ScalarKind::Uint => Some(ScalarKind::Uint),
        naga::ScalarKind::Bool => Some(ScalarKind::Bool),
        _ => None,
    }
}

fn resource_binding(module: &naga::Module, global: naga::Handle<naga::GlobalVariable>) -> Option<ResourceBinding> {
    let var = &module.global_variables[global];
    let binding = var.binding.as_ref()?;
    let (class, count) = match var.space {
        naga::AddressSpace::Uniform => (ResourceClass::UniformBuffer, 1),
        naga::AddressSpace::Storage { .. } => (ResourceClass::StorageBuffer, 1),
        naga::AddressSpace::Handle => handle_class(module, var.ty)?,
        _ => return None,
    };
    Some(ResourceBinding {
        set: binding.group,
        binding: binding.binding,
        class,
        count,
    })
}

fn handle_class(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<(ResourceClass, u32)> {
    match module.types[ty].inner {
        naga::TypeInner::Image {
            class: naga::ImageClass::Storage { .. },
            ..
        } => Some((ResourceClass::StorageImage, 1)),
        naga::TypeInner::Image { .. } => Some((ResourceClass::SampledImage, 1)),
        naga::TypeInner::Sampler { .. } => Some((ResourceClass::Sampler, 1)),
        naga::TypeInner::BindingArray { base, size } => {
            let (class, _) = handle_class(module, base)?;
            let count = match size {
                naga::ArraySize::Constant(n) => n.get(),
                _ => 1,
            };
            Some((class, count))
        }
        _ => None,
    }
}

/// Numeric interpretation of a vertex attribute format.
pub fn format_kind(format: vk::Format) -> ScalarKind {
    use vk::Format as F;
    match format {
        F::R8_UINT | F::R8G8_UINT | F::R8G8B8_UINT | F::B8G8R8_UINT | F::R8G8B8A8_UINT | F::B8G8R8A8_UINT
        | F::A8B8G8R8_UINT_PACK32 | F::A2R10G10B10_UINT_PACK32 | F::A2B10G10R10_UINT_PACK32 | F::R16_UINT
        | F::R16G16_UINT | F::R16G16B16_UINT | F::R16G16B16A16_UINT | F::R32_UINT | F::R32G32_UINT
        | F::R32G32B32_UINT | F::R32G32B32A32_UINT | F::R64_UINT | F::R64G64_UINT | F::R64G64B64_UINT
        | F::R64G64B64A64_UINT | F::S8_UINT => ScalarKind::Uint,
        F::R8_SINT | F::R8G8_SINT | F::R8G8B8_SINT | F::B8G8R8_SINT | F::R8G8B8A8_SINT | F::B8G8R8A8_SINT
        | F::A8B8G8R8_SINT_PACK32 | F::A2R10G10B10_SINT_PACK32 | F::A2B10G10R10_SINT_PACK32 | F::R16_SINT
        | F::R16G16_SINT | F::R16G16B16_SINT | F::R16G16B16A16_SINT | F::R32_SINT | F::R32G32_SINT
        | F::R32G32B32_SINT | F::R32G32B32A32_SINT | F::R64_SINT | F::R64G64_SINT | F::R64G64B64_SINT
        | F::R64G64B64A64_SINT => ScalarKind::Sint,
        _ => ScalarKind::Float,
    }
}

/// Reflection of `module`, computed once and cached on the module.
pub(crate) fn module_reflection(
    objects: &mut Objects,
    reflector: &dyn ShaderReflector,
    module: Handle,
) -> Option<Result<Arc<ShaderReflection>, String>> {
    let state = objects.shader_modules.get_mut(&module)?;
    let words = state.words.clone();
    let reflection = state
        .reflection
        .get_or_insert_with(|| reflector.reflect(&words).map(Arc::new).map_err(|e| e.to_string()));
    Some(reflection.clone())
}

/// A pipeline stage whose entry point was found in its module's reflection.
struct ReflectedStage {
    stage: ShaderStage,
    module: Handle,
    reflection: Arc<ShaderReflection>,
    index: usize,
}

impl ReflectedStage {
    fn entry(&self) -> &EntryPointReflection {
        &self.reflection.entry_points[self.index]
    }
}

/// Collects findings for one pipeline create info.
struct PipelineCheck<'a> {
    entry: EntryPoint,
    index: usize,
    issues: &'a mut Vec<Diagnostic>,
}

impl PipelineCheck<'_> {
    fn push(&mut self, kind: ErrorKind, message_id: &'static str, module: Option<Handle>, message: String) -> &mut Diagnostic {
        let mut diag = Diagnostic::new(
            kind,
            message_id,
            format!("{}: pCreateInfos[{}]: {}", self.entry.name(), self.index, message),
        );
        if let Some(module) = module {
            diag = diag.with_object(ObjectType::ShaderModule, module);
        }
        self.issues.push(diag);
        let last = self.issues.len() - 1;
        &mut self.issues[last]
    }

    fn interface(&mut self, message_id: &'static str, module: Handle, message: String) {
        self.push(ErrorKind::ShaderInterfaceMismatch, message_id, Some(module), message);
    }

    fn binding(&mut self, message_id: &'static str, module: Handle, message: String) {
        self.push(ErrorKind::BindingMismatch, message_id, Some(module), message);
    }
}

fn reflect_stages(
    objects: &mut Objects,
    reflector: &dyn ShaderReflector,
    stages: &[&PipelineShaderStageCreateInfo],
    check: &mut PipelineCheck<'_>,
) -> Vec<ReflectedStage> {
    let mut reflected = Vec::new();
    for info in stages {
        let Some(stage) = ShaderStage::from_vk(vk::ShaderStageFlags::from_raw(info.stage)) else {
            continue;
        };
        let reflection = match module_reflection(objects, reflector, info.module) {
            // Unknown modules are reported by the lifetime tracker.
            None => continue,
            Some(Ok(reflection)) => reflection,
            Some(Err(e)) => {
                check
                    .push(
                        ErrorKind::ShaderInterfaceMismatch,
                        "ShaderValidation-ReflectionFailed",
                        Some(info.module),
                        format!("{} shader could not be reflected, skipping its checks: {}", stage, e),
                    )
                    .severity = Severity::Warning;
                continue;
            }
        };
        match reflection
            .entry_points
            .iter()
            .position(|ep| ep.name == info.entry_point && ep.stage == stage)
        {
            Some(index) => reflected.push(ReflectedStage {
                stage,
                module: info.module,
                reflection,
                index,
            }),
            None => check.interface(
                "ShaderValidation-MissingEntryPoint",
                info.module,
                format!("shader module has no {} entry point named {:?}", stage, info.entry_point),
            ),
        }
    }
    reflected.sort_by_key(|s| s.stage);
    reflected
}

fn check_stage_interface(producer: &ReflectedStage, consumer: &ReflectedStage, check: &mut PipelineCheck<'_>) {
    let outputs = &producer.entry().outputs;
    let inputs = &consumer.entry().inputs;
    for input in inputs {
        match outputs.iter().find(|o| o.location == input.location) {
            None => check.interface(
                "ShaderValidation-InterfaceMismatch",
                consumer.module,
                format!(
                    "{} shader input at location {} is not written by the {} shader",
                    consumer.stage, input.location, producer.stage
                ),
            ),
            Some(output) if output.kind != input.kind || output.components < input.components => check.interface(
                "ShaderValidation-InterfaceMismatch",
                consumer.module,
                format!(
                    "type mismatch at location {}: {} shader writes {}, {} shader reads {}",
                    input.location, producer.stage, output, consumer.stage, input
                ),
            ),
            Some(_) => {}
        }
    }
    for output in outputs {
        if !inputs.iter().any(|i| i.location == output.location) {
            check
                .push(
                    ErrorKind::ShaderInterfaceMismatch,
                    "ShaderValidation-UnusedOutput",
                    Some(producer.module),
                    format!(
                        "{} shader output at location {} is not consumed by the {} shader",
                        producer.stage, output.location, consumer.stage
                    ),
                )
                .severity = Severity::Warning;
        }
    }
}

fn check_resources(stage: &ReflectedStage, layout: &PipelineLayoutState, check: &mut PipelineCheck<'_>) {
    for resource in &stage.entry().resources {
        let declared = layout
            .set_layouts
            .get(resource.set as usize)
            .and_then(|(_, set_layout)| set_layout.bindings.get(&resource.binding));
        let Some(declared) = declared else {
            check.binding(
                "ShaderValidation-ResourceNotInLayout",
                stage.module,
                format!(
                    "{} shader uses set {} binding {}, which the pipeline layout does not declare",
                    stage.stage, resource.set, resource.binding
                ),
            );
            continue;
        };
        if !resource.class.accepts(declared.descriptor_type) {
            check.binding(
                "ShaderValidation-DescriptorTypeMismatch",
                stage.module,
                format!(
                    "{} shader uses set {} binding {} as {:?}, but the layout declares {:?}",
                    stage.stage, resource.set, resource.binding, resource.class, declared.descriptor_type
                ),
            );
        }
        if declared.count < resource.count {
            check.binding(
                "ShaderValidation-DescriptorCount",
                stage.module,
                format!(
                    "{} shader uses {} descriptors at set {} binding {}, but the layout declares {}",
                    stage.stage, resource.count, resource.set, resource.binding, declared.count
                ),
            );
        }
        if !declared.stage_flags.contains(stage.stage.to_vk()) {
            check.binding(
                "ShaderValidation-StageVisibility",
                stage.module,
                format!(
                    "set {} binding {} is not visible to the {} stage (stageFlags {:?})",
                    resource.set, resource.binding, stage.stage, declared.stage_flags
                ),
            );
        }
    }
}

/// Interface checks for one graphics pipeline create info.
pub(crate) fn validate_graphics_pipeline(
    objects: &mut Objects,
    reflector: &dyn ShaderReflector,
    index: usize,
    info: &GraphicsPipelineCreateInfo,
    issues: &mut Vec<Diagnostic>,
) {
    let mut check = PipelineCheck {
        entry: EntryPoint::CreateGraphicsPipelines,
        index,
        issues,
    };
    let stage_infos: Vec<_> = info.stages.iter().collect();
    let stages = reflect_stages(objects, reflector, &stage_infos, &mut check);

    for pair in stages.windows(2) {
        check_stage_interface(&pair[0], &pair[1], &mut check);
    }

    if let Some(vertex) = stages.iter().find(|s| s.stage == ShaderStage::Vertex) {
        for input in &vertex.entry().inputs {
            match info
                .vertex_input
                .attributes
                .iter()
                .find(|a| a.location == input.location)
            {
                None => check.interface(
                    "ShaderValidation-VertexInputMissing",
                    vertex.module,
                    format!(
                        "vertex shader input at location {} has no vertex attribute description",
                        input.location
                    ),
                ),
                Some(attribute) => {
                    let format = vk::Format::from_raw(attribute.format);
                    if format_kind(format) != input.kind {
                        check.interface(
                            "ShaderValidation-VertexInputFormat",
                            vertex.module,
                            format!(
                                "vertex attribute at location {} has format {:?}, but the vertex shader reads {:?}",
                                input.location, format, input.kind
                            ),
                        );
                    }
                }
            }
        }
    }

    if let Some(fragment) = stages.iter().find(|s| s.stage == ShaderStage::Fragment) {
        let color_count = objects
            .render_passes
            .get(&info.render_pass)
            .and_then(|rp| rp.subpasses.get(info.subpass as usize))
            .map(|subpass| subpass.color.len() as u32);
        if let Some(color_count) = color_count {
            for output in &fragment.entry().outputs {
                if output.location >= color_count {
                    check.interface(
                        "ShaderValidation-FragmentOutput",
                        fragment.module,
                        format!(
                            "fragment shader writes location {}, but subpass {} has {} color attachments",
                            output.location, info.subpass, color_count
                        ),
                    );
                }
            }
        }
    }

    if let Some(layout) = objects.pipeline_layouts.get(&info.layout).cloned() {
        for stage in &stages {
            check_resources(stage, &layout, &mut check);
        }
    }
}

/// Interface checks for one compute pipeline create info.
pub(crate) fn validate_compute_pipeline(
    objects: &mut Objects,
    reflector: &dyn ShaderReflector,
    index: usize,
    info: &ComputePipelineCreateInfo,
    issues: &mut Vec<Diagnostic>,
) {
    let mut check = PipelineCheck {
        entry: EntryPoint::CreateComputePipelines,
        index,
        issues,
    };
    let stages = reflect_stages(objects, reflector, &[&info.stage], &mut check);
    if let Some(layout) = objects.pipeline_layouts.get(&info.layout).cloned() {
        for stage in &stages {
            check_resources(stage, &layout, &mut check);
        }
    }
}

/// `(set, binding)` pairs statically used by the given stages.
pub(crate) fn used_bindings<'a>(
    objects: &mut Objects,
    reflector: &dyn ShaderReflector,
    stages: impl IntoIterator<Item = &'a PipelineShaderStageCreateInfo>,
) -> Vec<(u32, u32)> {
    let mut used = Vec::new();
    for info in stages {
        let Some(stage) = ShaderStage::from_vk(vk::ShaderStageFlags::from_raw(info.stage)) else {
            continue;
        };
        if let Some(Ok(reflection)) = module_reflection(objects, reflector, info.module) {
            if let Some(entry) = reflection.entry_point(&info.entry_point, stage) {
                used.extend(entry.resources.iter().map(|r| (r.set, r.binding)));
            }
        }
    }
    used.sort_unstable();
    used.dedup();
    used
}
