//! 帧脚本加载
//!
//! 把 JSON 描述的帧脚本解析成 [`FgScript`]：建立命名资源、
//! 按声明顺序构造操作树、解析字符串形式的 flags。
//!
//! 操作是"单键对象"的有序数组，键即操作种类：
//!
//! ```json
//! {
//!     "name": "forward",
//!     "textures": [
//!         { "name": "color", "format": "R8G8B8A8_UNORM",
//!           "width": 1.0, "height": 1.0, "relative": true,
//!           "usage": "color|sampled" }
//!     ],
//!     "read_write_buffers": [ { "name": "histogram", "size": 1024 } ],
//!     "ops": [
//!         { "begin_submission": { "name": "main_begin" } },
//!         { "pass": { "name": "forward", "attachments": [ { "name": "color", "clear": [0, 0, 0, 1] } ],
//!                     "subpasses": [ { "name": "geometry", "attachments": [0],
//!                                      "ops": [ { "batch": { "name": "opaque", "group": "Opaque" } } ] } ] } },
//!         { "swap": { "name": "present", "texture": "color" } },
//!         { "end_submission": { "name": "main_end" } }
//!     ]
//! }
//! ```
//!
//! 引用了未知资源/附件名的脚本在这里报错，错误信息带上脚本名和字段；
//! 结构性前置条件（例如缺少收尾的 end-submission）则在 build 时断言。

use std::path::Path;

use anyhow::{Context, Result, bail};
use ash::vk;
use serde::Deserialize;

use nebula_gfx::{
    GfxBufferCreateInfo, GfxBufferRange, GfxImageCreateInfo, GfxImageSubresRange, GfxQueueType, GfxResourceManager,
};

use crate::context::FgLoadContext;
use crate::op::{
    FgAttachment, FgBatchOp, FgBlitOp, FgBufferAccess, FgComputeOp, FgCopyOp, FgFullscreenEffectOp, FgGlobalStateOp,
    FgLoadOp, FgMipmapOp, FgOp, FgOpKind, FgOpNode, FgPassOp, FgPluginOp, FgSubmissionOp, FgSubmissionPhase,
    FgSubpass, FgSwapOp, FgTextureAccess,
};
use crate::script::FgScript;
use crate::state::FgImageState;

// ============ 原始反序列化结构 ============

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct RawScript {
    name: String,
    #[serde(default)]
    textures: Vec<RawTexture>,
    #[serde(default)]
    read_write_buffers: Vec<RawBuffer>,
    #[serde(default)]
    ops: Vec<RawOp>,
}

#[derive(Deserialize)]
struct RawTexture {
    name: String,
    format: String,
    /// relative 为 true 时是窗口尺寸的缩放系数，否则是像素数
    width: f32,
    height: f32,
    #[serde(default)]
    relative: bool,
    usage: String,
    #[serde(default = "default_one")]
    mips: u32,
    #[serde(default = "default_one")]
    layers: u32,
    #[serde(default = "default_one")]
    samples: u32,
    /// 与已声明纹理共享内存
    #[serde(default)]
    alias: Option<String>,
}

#[derive(Deserialize)]
struct RawBuffer {
    name: String,
    size: u64,
}

#[derive(Deserialize)]
struct RawDependency {
    name: String,
    access: String,
    stage: String,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    aspect: Option<String>,
    #[serde(default)]
    mip: Option<u32>,
    #[serde(default)]
    mip_count: Option<u32>,
    #[serde(default)]
    layer: Option<u32>,
    #[serde(default)]
    layer_count: Option<u32>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct RawTransfer {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    from: String,
    to: String,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawMipmap {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    texture: String,
}

#[derive(Deserialize)]
struct RawCompute {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    dispatch: Option<[u32; 3]>,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawPlugin {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    callback: Option<String>,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawAttachment {
    name: String,
    #[serde(default)]
    clear: Option<[f32; 4]>,
    #[serde(default)]
    load: Option<bool>,
    #[serde(default = "default_true")]
    store: bool,
}

/// 附件/先行 subpass 的引用：下标或名称
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexOrName {
    Index(u32),
    Name(String),
}

#[derive(Deserialize)]
struct RawSubpass {
    name: String,
    #[serde(default)]
    attachments: Vec<IndexOrName>,
    #[serde(default)]
    inputs: Vec<IndexOrName>,
    #[serde(default)]
    subpass_dependencies: Vec<IndexOrName>,
    #[serde(default)]
    depth: bool,
    #[serde(default)]
    ops: Vec<RawSubpassOp>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawSubpassOp {
    #[serde(alias = "call")]
    Plugin(RawPlugin),
    Batch(RawBatch),
    SortedBatch(RawBatch),
    FullscreenEffect(RawFullscreen),
}

#[derive(Deserialize)]
struct RawBatch {
    name: String,
    group: String,
}

#[derive(Deserialize)]
struct RawFullscreen {
    name: String,
    program: String,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawPass {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    depth_stencil: Option<RawAttachment>,
    #[serde(default)]
    subpasses: Vec<RawSubpass>,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawSubmission {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    wait_for_queue: Option<String>,
}

#[derive(Deserialize)]
struct RawBarrier {
    name: String,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    resource_dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawSwap {
    name: String,
    texture: String,
}

#[derive(Deserialize)]
struct RawGlobalState {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawOp {
    Blit(RawTransfer),
    Copy(RawTransfer),
    Mipmap(RawMipmap),
    Compute(RawCompute),
    #[serde(alias = "call")]
    Plugin(RawPlugin),
    Pass(RawPass),
    BeginSubmission(RawSubmission),
    EndSubmission(RawSubmission),
    Barrier(RawBarrier),
    Swap(RawSwap),
    GlobalState(RawGlobalState),
    #[serde(alias = "_comment")]
    Comment(serde_json::Value),
}

// ============ 字符串 -> vk flags ============

fn parse_format(s: &str) -> Result<vk::Format> {
    let format = match s {
        "R8_UNORM" => vk::Format::R8_UNORM,
        "R8G8B8A8_UNORM" => vk::Format::R8G8B8A8_UNORM,
        "R8G8B8A8_SRGB" => vk::Format::R8G8B8A8_SRGB,
        "B8G8R8A8_UNORM" => vk::Format::B8G8R8A8_UNORM,
        "R16_SFLOAT" => vk::Format::R16_SFLOAT,
        "R16G16B16A16_SFLOAT" => vk::Format::R16G16B16A16_SFLOAT,
        "R32_SFLOAT" => vk::Format::R32_SFLOAT,
        "R32_UINT" => vk::Format::R32_UINT,
        "R32G32B32A32_SFLOAT" => vk::Format::R32G32B32A32_SFLOAT,
        "R11G11B10_UFLOAT" => vk::Format::B10G11R11_UFLOAT_PACK32,
        "D16_UNORM" => vk::Format::D16_UNORM,
        "D24_UNORM_S8_UINT" => vk::Format::D24_UNORM_S8_UINT,
        "D32_SFLOAT" => vk::Format::D32_SFLOAT,
        "D32_SFLOAT_S8_UINT" => vk::Format::D32_SFLOAT_S8_UINT,
        other => bail!("unknown texture format \"{other}\""),
    };
    Ok(format)
}

fn parse_usage(s: &str) -> Result<vk::ImageUsageFlags> {
    let mut usage = vk::ImageUsageFlags::empty();
    for part in s.split('|').map(str::trim) {
        usage |= match part {
            "color" => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            "depth_stencil" => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "sampled" => vk::ImageUsageFlags::SAMPLED,
            "storage" => vk::ImageUsageFlags::STORAGE,
            "input" => vk::ImageUsageFlags::INPUT_ATTACHMENT,
            "transfer_src" => vk::ImageUsageFlags::TRANSFER_SRC,
            "transfer_dst" => vk::ImageUsageFlags::TRANSFER_DST,
            other => bail!("unknown texture usage \"{other}\""),
        };
    }
    Ok(usage)
}

fn parse_access(s: &str) -> Result<vk::AccessFlags2> {
    let mut access = vk::AccessFlags2::empty();
    for part in s.split('|').map(str::trim) {
        access |= match part {
            "shader_read" => vk::AccessFlags2::SHADER_READ,
            "shader_write" => vk::AccessFlags2::SHADER_WRITE,
            "storage_read" => vk::AccessFlags2::SHADER_STORAGE_READ,
            "storage_write" => vk::AccessFlags2::SHADER_STORAGE_WRITE,
            "sampled_read" => vk::AccessFlags2::SHADER_SAMPLED_READ,
            "uniform_read" => vk::AccessFlags2::UNIFORM_READ,
            "input_attachment_read" => vk::AccessFlags2::INPUT_ATTACHMENT_READ,
            "color_attachment_read" => vk::AccessFlags2::COLOR_ATTACHMENT_READ,
            "color_attachment_write" => vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            "depth_stencil_read" => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
            "depth_stencil_write" => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            "transfer_read" => vk::AccessFlags2::TRANSFER_READ,
            "transfer_write" => vk::AccessFlags2::TRANSFER_WRITE,
            "host_read" => vk::AccessFlags2::HOST_READ,
            "host_write" => vk::AccessFlags2::HOST_WRITE,
            "memory_read" => vk::AccessFlags2::MEMORY_READ,
            "memory_write" => vk::AccessFlags2::MEMORY_WRITE,
            "indirect_read" => vk::AccessFlags2::INDIRECT_COMMAND_READ,
            other => bail!("unknown access \"{other}\""),
        };
    }
    Ok(access)
}

fn parse_stage(s: &str) -> Result<vk::PipelineStageFlags2> {
    let mut stage = vk::PipelineStageFlags2::empty();
    for part in s.split('|').map(str::trim) {
        stage |= match part {
            "top_of_pipe" => vk::PipelineStageFlags2::TOP_OF_PIPE,
            "bottom_of_pipe" => vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            "draw_indirect" => vk::PipelineStageFlags2::DRAW_INDIRECT,
            "vertex_input" => vk::PipelineStageFlags2::VERTEX_INPUT,
            "vertex_shader" => vk::PipelineStageFlags2::VERTEX_SHADER,
            "pixel_shader" | "fragment_shader" => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            "early_fragment_tests" => vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
            "late_fragment_tests" => vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            "color_attachment_output" => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            "compute_shader" => vk::PipelineStageFlags2::COMPUTE_SHADER,
            "transfer" => vk::PipelineStageFlags2::TRANSFER,
            "all_graphics" => vk::PipelineStageFlags2::ALL_GRAPHICS,
            "all_commands" => vk::PipelineStageFlags2::ALL_COMMANDS,
            other => bail!("unknown pipeline stage \"{other}\""),
        };
    }
    Ok(stage)
}

fn parse_layout(s: &str) -> Result<vk::ImageLayout> {
    let layout = match s {
        "undefined" => vk::ImageLayout::UNDEFINED,
        "general" => vk::ImageLayout::GENERAL,
        "color_attachment" => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        "depth_stencil" => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        "depth_stencil_read" => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        "shader_read" => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        "transfer_src" => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        "transfer_dst" => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        "present" => vk::ImageLayout::PRESENT_SRC_KHR,
        other => bail!("unknown image layout \"{other}\""),
    };
    Ok(layout)
}

fn parse_aspect(s: &str) -> Result<vk::ImageAspectFlags> {
    let aspect = match s {
        "color" => vk::ImageAspectFlags::COLOR,
        "depth" => vk::ImageAspectFlags::DEPTH,
        "stencil" => vk::ImageAspectFlags::STENCIL,
        "depth_stencil" => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        other => bail!("unknown image aspect \"{other}\""),
    };
    Ok(aspect)
}

fn parse_queue(s: Option<&str>) -> Result<GfxQueueType> {
    let queue = match s {
        None | Some("graphics") => GfxQueueType::Graphics,
        Some("compute") => GfxQueueType::Compute,
        Some("transfer") => GfxQueueType::Transfer,
        Some(other) => bail!("unknown queue \"{other}\""),
    };
    Ok(queue)
}

// ============ 加载入口 ============

/// 从文件加载帧脚本
pub fn load_frame_script(
    path: impl AsRef<Path>,
    window_extent: (u32, u32),
    res_mgr: &mut GfxResourceManager,
    ctx: &mut FgLoadContext,
) -> Result<FgScript> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read frame script {}", path.display()))?;
    load_frame_script_str(&text, window_extent, res_mgr, ctx)
        .with_context(|| format!("failed to load frame script {}", path.display()))
}

/// 从 JSON 字符串加载帧脚本
///
/// `window_extent` 用于解析窗口相对尺寸的纹理。
pub fn load_frame_script_str(
    json: &str,
    window_extent: (u32, u32),
    res_mgr: &mut GfxResourceManager,
    ctx: &mut FgLoadContext,
) -> Result<FgScript> {
    let _span = tracy_client::span!("frame_graph::load_frame_script");

    let raw: RawScript = serde_json::from_str(json).context("failed to parse frame script json")?;
    let script_name = raw.name.clone();
    let mut script = FgScript::new(&raw.name);

    // 命名纹理
    for texture in &raw.textures {
        let err_ctx = || format!("script \"{script_name}\": texture \"{}\"", texture.name);

        let format = parse_format(&texture.format).with_context(err_ctx)?;
        let usage = parse_usage(&texture.usage).with_context(err_ctx)?;

        let (width, height, relative_size) = if texture.relative {
            let width = ((window_extent.0 as f32 * texture.width) as u32).max(1);
            let height = ((window_extent.1 as f32 * texture.height) as u32).max(1);
            (width, height, Some((texture.width, texture.height)))
        } else {
            (texture.width as u32, texture.height as u32, None)
        };

        // 默认 layout：深度格式用深度附件布局，纯存储图用 general，其余 shader-read
        let aspect = GfxImageCreateInfo::infer_aspect(format);
        let default_layout = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if usage.contains(vk::ImageUsageFlags::STORAGE) && !usage.contains(vk::ImageUsageFlags::SAMPLED) {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        };

        let mut info = GfxImageCreateInfo::new_2d(width, height, format, usage)
            .with_mips_layers(texture.mips, texture.layers)
            .with_default_layout(default_layout);
        info.samples = vk::SampleCountFlags::from_raw(texture.samples);
        info.relative_size = relative_size;

        let handle = res_mgr.create_image(info, &texture.name);
        if let Some(alias_target) = &texture.alias {
            if script.texture(alias_target).is_none() {
                bail!("{}: unknown alias target \"{alias_target}\"", err_ctx());
            }
            script.add_texture_alias(&texture.name, handle, alias_target);
        } else {
            script.add_texture(&texture.name, handle);
        }
    }

    // 命名缓冲区
    for buffer in &raw.read_write_buffers {
        let info = GfxBufferCreateInfo::new(
            buffer.size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        );
        let handle = res_mgr.create_buffer(info, &buffer.name);
        script.add_buffer(&buffer.name, handle);
    }

    // 操作树
    let mut loader = OpLoader {
        script_name: &script_name,
        script: &mut script,
        res_mgr,
        ctx,
        open_submissions: [false; GfxQueueType::COUNT],
    };
    for raw_op in raw.ops {
        if let Some(op) = loader.load_op(raw_op)? {
            loader.script.push_op(op);
        }
    }
    if let Some(queue) = GfxQueueType::ALL.iter().find(|q| loader.open_submissions[q.index()]) {
        bail!("script \"{script_name}\": submission on {queue:?} queue is never ended");
    }

    log::info!(
        "frame script \"{}\" loaded: {} textures, {} buffers, {} ops",
        script_name,
        raw.textures.len(),
        raw.read_write_buffers.len(),
        script.ops().len()
    );
    Ok(script)
}

/// 操作解析的工作状态
struct OpLoader<'a> {
    script_name: &'a str,
    script: &'a mut FgScript,
    res_mgr: &'a mut GfxResourceManager,
    ctx: &'a mut FgLoadContext,
    /// 各队列是否有未收尾的 submission
    open_submissions: [bool; GfxQueueType::COUNT],
}

impl OpLoader<'_> {
    /// 解析单个操作；comment 返回 None
    fn load_op(&mut self, raw: RawOp) -> Result<Option<FgOp>> {
        let op = match raw {
            RawOp::Comment(_) => return Ok(None),

            RawOp::Blit(transfer) => {
                let (node, src, dst) = self.load_transfer(transfer)?;
                FgOp::new(node, FgOpKind::Blit(FgBlitOp { src, dst }))
            }
            RawOp::Copy(transfer) => {
                let (node, src, dst) = self.load_transfer(transfer)?;
                FgOp::new(node, FgOpKind::Copy(FgCopyOp { src, dst }))
            }
            RawOp::Mipmap(mipmap) => {
                let queue = parse_queue(mipmap.queue.as_deref())
                    .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, mipmap.name))?;
                let image = self.resolve_texture(&mipmap.name, &mipmap.texture)?;
                let range = self.full_image_range(image);
                // mip 链生成在 transfer stage 自读自写
                let node = FgOpNode::new(&mipmap.name, queue).with_texture_access(FgTextureAccess {
                    handle: image,
                    name: mipmap.texture.clone(),
                    access: vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE,
                    stage: vk::PipelineStageFlags2::TRANSFER,
                    layout: vk::ImageLayout::GENERAL,
                    range,
                });
                FgOp::new(node, FgOpKind::Mipmap(FgMipmapOp { image }))
            }
            RawOp::Compute(compute) => {
                let queue = parse_queue(compute.queue.as_deref())
                    .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, compute.name))?;
                let mut node = FgOpNode::new(&compute.name, queue);
                self.declare_dependencies(&mut node, &compute.resource_dependencies)?;
                FgOp::new(
                    node,
                    FgOpKind::Compute(FgComputeOp {
                        program: compute.program.unwrap_or_else(|| compute.name.clone()),
                        group_count: compute.dispatch.unwrap_or([1, 1, 1]),
                    }),
                )
            }
            RawOp::Plugin(plugin) => self.load_plugin(plugin)?,
            RawOp::Pass(pass) => self.load_pass(pass)?,
            RawOp::BeginSubmission(submission) => self.load_submission(submission, FgSubmissionPhase::Begin)?,
            RawOp::EndSubmission(submission) => self.load_submission(submission, FgSubmissionPhase::End)?,
            RawOp::Barrier(barrier) => {
                let queue = parse_queue(barrier.queue.as_deref())
                    .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, barrier.name))?;
                let mut node = FgOpNode::new(&barrier.name, queue);
                self.declare_dependencies(&mut node, &barrier.resource_dependencies)?;
                FgOp::new(node, FgOpKind::Barrier)
            }
            RawOp::Swap(swap) => {
                let image = self.resolve_texture(&swap.name, &swap.texture)?;
                let range = self.full_image_range(image);
                let state = FgImageState::PRESENT;
                let node = FgOpNode::new(&swap.name, GfxQueueType::Graphics).with_texture_access(FgTextureAccess {
                    handle: image,
                    name: swap.texture.clone(),
                    access: state.access,
                    stage: state.stage,
                    layout: state.layout,
                    range,
                });
                FgOp::new(node, FgOpKind::Swap(FgSwapOp { image }))
            }
            RawOp::GlobalState(global) => {
                FgOp::new(FgOpNode::new(&global.name, GfxQueueType::Graphics), FgOpKind::GlobalState(FgGlobalStateOp::default()))
            }
        };
        Ok(Some(op))
    }

    /// blit/copy 的公共部分：解析两端纹理并声明 transfer 访问
    fn load_transfer(&mut self, transfer: RawTransfer) -> Result<(FgOpNode, nebula_gfx::GfxImageHandle, nebula_gfx::GfxImageHandle)> {
        let queue = parse_queue(transfer.queue.as_deref())
            .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, transfer.name))?;
        let src = self.resolve_texture(&transfer.name, &transfer.from)?;
        let dst = self.resolve_texture(&transfer.name, &transfer.to)?;

        let src_state = FgImageState::TRANSFER_SRC;
        let dst_state = FgImageState::TRANSFER_DST;
        let src_range = self.full_image_range(src);
        let dst_range = self.full_image_range(dst);

        let mut node = FgOpNode::new(&transfer.name, queue)
            .with_texture_access(FgTextureAccess {
                handle: src,
                name: transfer.from.clone(),
                access: src_state.access,
                stage: src_state.stage,
                layout: src_state.layout,
                range: src_range,
            })
            .with_texture_access(FgTextureAccess {
                handle: dst,
                name: transfer.to.clone(),
                access: dst_state.access,
                stage: dst_state.stage,
                layout: dst_state.layout,
                range: dst_range,
            });
        self.declare_dependencies(&mut node, &transfer.resource_dependencies)?;
        Ok((node, src, dst))
    }

    fn load_plugin(&mut self, plugin: RawPlugin) -> Result<FgOp> {
        let queue = parse_queue(plugin.queue.as_deref())
            .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, plugin.name))?;
        let mut node = FgOpNode::new(&plugin.name, queue);
        self.declare_dependencies(&mut node, &plugin.resource_dependencies)?;
        Ok(FgOp::new(
            node,
            FgOpKind::Plugin(FgPluginOp {
                callback: plugin.callback.unwrap_or_else(|| plugin.name.clone()),
            }),
        ))
    }

    fn load_submission(&mut self, submission: RawSubmission, phase: FgSubmissionPhase) -> Result<FgOp> {
        let queue = parse_queue(submission.queue.as_deref())
            .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, submission.name))?;
        let wait_queue = match &submission.wait_for_queue {
            Some(s) => Some(
                parse_queue(Some(s))
                    .with_context(|| format!("script \"{}\": op \"{}\"", self.script_name, submission.name))?,
            ),
            None => None,
        };

        let open = &mut self.open_submissions[queue.index()];
        match phase {
            FgSubmissionPhase::Begin => {
                if *open {
                    bail!(
                        "script \"{}\": op \"{}\": {queue:?} queue already has an open submission",
                        self.script_name,
                        submission.name
                    );
                }
                *open = true;
            }
            FgSubmissionPhase::End => {
                if !*open {
                    bail!(
                        "script \"{}\": op \"{}\": {queue:?} queue has no open submission",
                        self.script_name,
                        submission.name
                    );
                }
                *open = false;
            }
        }
        self.ctx.note_submission(queue, &submission.name);

        Ok(FgOp::new(
            FgOpNode::new(&submission.name, queue),
            FgOpKind::Submission(FgSubmissionOp { phase, wait_queue }),
        ))
    }

    fn load_pass(&mut self, pass: RawPass) -> Result<FgOp> {
        let queue = parse_queue(pass.queue.as_deref())
            .with_context(|| format!("script \"{}\": pass \"{}\"", self.script_name, pass.name))?;
        let mut node = FgOpNode::new(&pass.name, queue);

        // 附件既建立 pass 的渲染目标，也作为节点的资源依赖参与 hazard 分析
        let mut attachments = Vec::with_capacity(pass.attachments.len());
        for raw_attachment in &pass.attachments {
            let handle = self.resolve_texture(&pass.name, &raw_attachment.name)?;
            let (load, clear_value) = match (raw_attachment.clear, raw_attachment.load) {
                (Some(clear), _) => (FgLoadOp::Clear, clear),
                (None, Some(true)) => (FgLoadOp::Load, [0.0; 4]),
                _ => (FgLoadOp::DontCare, [0.0; 4]),
            };

            let state = if load == FgLoadOp::Load {
                FgImageState::COLOR_ATTACHMENT_READ_WRITE
            } else {
                FgImageState::COLOR_ATTACHMENT_WRITE
            };
            let range = self.full_image_range(handle);
            node.texture_accesses.push(FgTextureAccess {
                handle,
                name: raw_attachment.name.clone(),
                access: state.access,
                stage: state.stage,
                layout: state.layout,
                range,
            });

            attachments.push(FgAttachment {
                name: raw_attachment.name.clone(),
                handle,
                load,
                store: raw_attachment.store,
                clear_value,
            });
        }

        let depth_stencil = match &pass.depth_stencil {
            Some(raw_depth) => {
                let handle = self.resolve_texture(&pass.name, &raw_depth.name)?;
                let state = FgImageState::DEPTH_ATTACHMENT_WRITE;
                let range = self.full_image_range(handle);
                node.texture_accesses.push(FgTextureAccess {
                    handle,
                    name: raw_depth.name.clone(),
                    access: state.access,
                    stage: state.stage,
                    layout: state.layout,
                    range,
                });
                Some(FgAttachment {
                    name: raw_depth.name.clone(),
                    handle,
                    load: if raw_depth.clear.is_some() { FgLoadOp::Clear } else { FgLoadOp::DontCare },
                    store: raw_depth.store,
                    clear_value: raw_depth.clear.unwrap_or([1.0, 0.0, 0.0, 0.0]),
                })
            }
            None => None,
        };

        self.declare_dependencies(&mut node, &pass.resource_dependencies)?;

        // subpass：附件引用解析成 pass 附件表的下标
        let mut subpasses = Vec::with_capacity(pass.subpasses.len());
        for (subpass_index, raw_subpass) in pass.subpasses.iter().enumerate() {
            let err_ctx = || format!("script \"{}\": pass \"{}\": subpass \"{}\"", self.script_name, pass.name, raw_subpass.name);

            let resolve_attachment = |r: &IndexOrName| -> Result<u32> {
                match r {
                    IndexOrName::Index(i) => {
                        if *i as usize >= attachments.len() {
                            bail!("{}: attachment index {} out of range", err_ctx(), i);
                        }
                        Ok(*i)
                    }
                    IndexOrName::Name(n) => attachments
                        .iter()
                        .position(|a| &a.name == n)
                        .map(|i| i as u32)
                        .ok_or_else(|| anyhow::anyhow!("{}: unknown attachment \"{}\"", err_ctx(), n)),
                }
            };
            let attachment_refs = raw_subpass.attachments.iter().map(resolve_attachment).collect::<Result<Vec<_>>>()?;
            let input_refs = raw_subpass.inputs.iter().map(resolve_attachment).collect::<Result<Vec<_>>>()?;

            let depends_on = raw_subpass
                .subpass_dependencies
                .iter()
                .map(|r| -> Result<u32> {
                    match r {
                        IndexOrName::Index(i) => {
                            if *i as usize >= subpass_index {
                                bail!("{}: subpass dependency {} must point to an earlier subpass", err_ctx(), i);
                            }
                            Ok(*i)
                        }
                        IndexOrName::Name(n) => pass.subpasses[..subpass_index]
                            .iter()
                            .position(|s| &s.name == n)
                            .map(|i| i as u32)
                            .ok_or_else(|| anyhow::anyhow!("{}: unknown prior subpass \"{}\"", err_ctx(), n)),
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            let mut ops = Vec::with_capacity(raw_subpass.ops.len());
            for raw_child in &raw_subpass.ops {
                ops.push(self.load_subpass_op(raw_child, queue)?);
            }

            subpasses.push(FgSubpass {
                node: FgOpNode::new(&raw_subpass.name, queue),
                attachment_refs,
                input_refs,
                depends_on,
                use_depth: raw_subpass.depth,
                ops,
            });
        }

        Ok(FgOp::new(
            node,
            FgOpKind::Pass(FgPassOp {
                attachments,
                depth_stencil,
                subpasses,
            }),
        ))
    }

    fn load_subpass_op(&mut self, raw: &RawSubpassOp, queue: GfxQueueType) -> Result<FgOp> {
        let op = match raw {
            RawSubpassOp::Plugin(plugin) => {
                let mut node = FgOpNode::new(&plugin.name, queue);
                self.declare_dependencies(&mut node, &plugin.resource_dependencies)?;
                FgOp::new(
                    node,
                    FgOpKind::Plugin(FgPluginOp {
                        callback: plugin.callback.clone().unwrap_or_else(|| plugin.name.clone()),
                    }),
                )
            }
            RawSubpassOp::Batch(batch) => FgOp::new(
                FgOpNode::new(&batch.name, queue),
                FgOpKind::Batch(FgBatchOp { group: batch.group.clone(), sorted: false }),
            ),
            RawSubpassOp::SortedBatch(batch) => FgOp::new(
                FgOpNode::new(&batch.name, queue),
                FgOpKind::Batch(FgBatchOp { group: batch.group.clone(), sorted: true }),
            ),
            RawSubpassOp::FullscreenEffect(effect) => {
                let mut node = FgOpNode::new(&effect.name, queue);
                self.declare_dependencies(&mut node, &effect.resource_dependencies)?;
                FgOp::new(
                    node,
                    FgOpKind::FullscreenEffect(FgFullscreenEffectOp { program: effect.program.clone() }),
                )
            }
        };
        Ok(op)
    }

    /// 把 resource_dependencies 解析成节点的声明访问
    ///
    /// 名称先查纹理表再查缓冲区表，都查不到时报错。
    fn declare_dependencies(&mut self, node: &mut FgOpNode, deps: &[RawDependency]) -> Result<()> {
        for dep in deps {
            let err_ctx =
                || format!("script \"{}\": op \"{}\": dependency \"{}\"", self.script_name, node.name, dep.name);

            let access = parse_access(&dep.access).with_context(err_ctx)?;
            let stage = parse_stage(&dep.stage).with_context(err_ctx)?;

            if let Some(handle) = self.script.texture(&dep.name) {
                let image = self.res_mgr.get_image(handle).expect("image handle is dead");
                let full = image.full_subres_range();

                let aspect = match &dep.aspect {
                    Some(s) => parse_aspect(s).with_context(err_ctx)?,
                    None => image.aspect(),
                };
                let base_mip = dep.mip.unwrap_or(0);
                let mip_count = dep.mip_count.unwrap_or(full.mip_count.saturating_sub(base_mip));
                let base_layer = dep.layer.unwrap_or(0);
                let layer_count = dep.layer_count.unwrap_or(full.layer_count.saturating_sub(base_layer));
                let layout = match &dep.layout {
                    Some(s) => parse_layout(s).with_context(err_ctx)?,
                    None => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };

                node.texture_accesses.push(FgTextureAccess {
                    handle,
                    name: dep.name.clone(),
                    access,
                    stage,
                    layout,
                    range: GfxImageSubresRange::new(aspect, base_mip, mip_count, base_layer, layer_count),
                });
            } else if let Some(handle) = self.script.buffer(&dep.name) {
                let range = GfxBufferRange::new(dep.offset.unwrap_or(0), dep.size.unwrap_or(vk::WHOLE_SIZE));
                node.buffer_accesses.push(FgBufferAccess {
                    handle,
                    name: dep.name.clone(),
                    access,
                    stage,
                    range,
                });
            } else {
                bail!("{}: unknown resource name", err_ctx());
            }
        }
        Ok(())
    }

    fn resolve_texture(&self, op_name: &str, texture_name: &str) -> Result<nebula_gfx::GfxImageHandle> {
        self.script.texture(texture_name).ok_or_else(|| {
            anyhow::anyhow!(
                "script \"{}\": op \"{}\": unknown texture \"{}\"",
                self.script_name,
                op_name,
                texture_name
            )
        })
    }

    fn full_image_range(&self, handle: nebula_gfx::GfxImageHandle) -> GfxImageSubresRange {
        self.res_mgr.get_image(handle).expect("image handle is dead").full_subres_range()
    }
}
