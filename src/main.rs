#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use anyhow::{Context, Result};
use gpui::Application;
use hand_pose_preview::{config::PreviewConfig, ui};

fn main() -> Result<()> {
    env_logger::init();

    let config = PreviewConfig::from_env().context("invalid preview configuration")?;
    log::info!(
        "preferring camera {:?}, up to {} hands, models in {}",
        config.preferred_camera,
        config.max_hands,
        config.model_dir.display()
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config.clone()) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
