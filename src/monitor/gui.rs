//! eframe window showing the latest value of every channel
//!
//! The poll loop runs on the tokio runtime and hands readings over an mpsc
//! channel; the window drains it on every frame.

use crate::controller::{EventKind, RawEvent};
use crate::monitor::{InputObserver, REFRESH_INTERVAL};
use eframe::egui::{self, Grid, RichText};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Forwards readings to the window, dropping them when it falls behind
pub struct GuiObserver {
    sender: mpsc::Sender<RawEvent>,
}

impl GuiObserver {
    pub fn new(sender: mpsc::Sender<RawEvent>) -> Self {
        Self { sender }
    }
}

impl InputObserver for GuiObserver {
    fn display(&mut self, event: &RawEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            debug!("Monitor window not keeping up: {}", e);
        }
    }
}

pub struct MonitorApp {
    title: String,
    receiver: mpsc::Receiver<RawEvent>,
    channels: BTreeMap<String, (EventKind, i32, String)>,
    shutdown: CancellationToken,
}

impl MonitorApp {
    pub fn new(
        title: String,
        receiver: mpsc::Receiver<RawEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            title,
            receiver,
            channels: BTreeMap::new(),
            shutdown,
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            let seen = event.timestamp.format("%H:%M:%S%.3f").to_string();
            self.channels.insert(event.code, (event.kind, event.value, seen));
        }
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.show(ctx);
    }
}

impl MonitorApp {
    fn show(&mut self, ctx: &egui::Context) {
        if self.shutdown.is_cancelled() {
            info!("Shutdown requested, closing monitor window");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        self.drain();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.ctx().request_repaint_after(REFRESH_INTERVAL);
            ui.heading(&self.title);
            ui.separator();

            if self.channels.is_empty() {
                ui.label("Waiting for input...");
                return;
            }

            Grid::new("channels")
                .num_columns(4)
                .striped(true)
                .show(ui, |ui| {
                    for (channel, (kind, value, seen)) in &self.channels {
                        ui.label(kind.to_string());
                        ui.label(RichText::new(channel).monospace());
                        ui.label(RichText::new(value.to_string()).monospace());
                        ui.label(RichText::new(seen).weak());
                        ui.end_row();
                    }
                });
        });
    }
}

/// Blocks until the window is closed
pub fn run(
    title: String,
    receiver: mpsc::Receiver<RawEvent>,
    shutdown: CancellationToken,
) -> Result<(), eframe::Error> {
    info!("Opening monitor window");
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default().with_inner_size([420.0, 360.0]);

    eframe::run_native(
        "hid2mav monitor",
        native_options,
        Box::new(|cc| {
            cc.egui_ctx.set_theme(egui::Theme::Dark);
            Ok(Box::new(MonitorApp::new(title, receiver, shutdown)))
        }),
    )
}
