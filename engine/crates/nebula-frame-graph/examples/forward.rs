//! 加载一份前向渲染帧脚本，build 后执行一帧并打印执行计划。
//!
//! ```bash
//! cargo run --example forward
//! ```

use std::sync::Arc;

use nebula_frame_graph::{FgLoadContext, load_frame_script_str};
use nebula_gfx::GfxResourceManager;

const FORWARD_SCRIPT: &str = r#"{
    "name": "forward",
    "textures": [
        { "name": "color", "format": "R16G16B16A16_SFLOAT",
          "width": 1.0, "height": 1.0, "relative": true,
          "usage": "color|sampled|transfer_src" },
        { "name": "depth", "format": "D32_SFLOAT",
          "width": 1.0, "height": 1.0, "relative": true,
          "usage": "depth_stencil" },
        { "name": "backbuffer", "format": "B8G8R8A8_UNORM",
          "width": 1280, "height": 720,
          "usage": "color|transfer_dst" }
    ],
    "read_write_buffers": [
        { "name": "luminance", "size": 4096 }
    ],
    "ops": [
        { "begin_submission": { "name": "main_begin" } },
        { "pass": {
            "name": "forward",
            "attachments": [ { "name": "color", "clear": [0.1, 0.1, 0.1, 1] } ],
            "depth_stencil": { "name": "depth", "clear": [1, 0, 0, 0] },
            "subpasses": [
                { "name": "geometry", "attachments": [0], "depth": true,
                  "ops": [
                      { "batch": { "name": "opaque", "group": "Opaque" } },
                      { "sorted_batch": { "name": "alpha", "group": "Alpha" } }
                  ] }
            ]
        } },
        { "compute": {
            "name": "luminance_reduce", "program": "luminance", "dispatch": [30, 17, 1],
            "resource_dependencies": [
                { "name": "color", "access": "sampled_read", "stage": "compute_shader", "layout": "shader_read" },
                { "name": "luminance", "access": "storage_write", "stage": "compute_shader" }
            ]
        } },
        { "blit": { "name": "to_backbuffer", "from": "color", "to": "backbuffer" } },
        { "call": { "name": "debug_overlay" } },
        { "swap": { "name": "present", "texture": "backbuffer" } },
        { "end_submission": { "name": "main_end" } }
    ]
}"#;

fn main() -> anyhow::Result<()> {
    nebula_crate_tools::init_log::init_log();

    let mut res_mgr = GfxResourceManager::new();
    let mut ctx = FgLoadContext::new();
    ctx.register_callback(
        "debug_overlay",
        Arc::new(|cmd, frame_index, _buffer_index| {
            cmd.insert_marker(format!("debug overlay, frame {frame_index}"));
        }),
    );

    let mut script = load_frame_script_str(FORWARD_SCRIPT, (1920, 1080), &mut res_mgr, &mut ctx)?;
    script.build(&mut res_mgr, &ctx);
    script.compiled().unwrap().log_execution_plan();

    for frame_index in 0..3 {
        let submissions = script.run(&res_mgr, frame_index, (frame_index % 2) as u32);
        for submission in &submissions {
            log::info!(
                "frame {}: submit {} commands to {:?} (wait: {:?}, frame done: {})",
                frame_index,
                submission.cmd.commands().len(),
                submission.queue,
                submission.wait_queue,
                submission.signal_frame_done
            );
        }
    }

    // 窗口 resize 触发整体 rebuild
    script.on_window_resized(&mut res_mgr, &ctx, 2560, 1440);
    script.compiled().unwrap().log_execution_plan();

    script.discard(&mut res_mgr);
    Ok(())
}
