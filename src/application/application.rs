use std::sync::mpsc::Receiver;

use eframe::egui::{self, Context, ProgressBar, RichText, Ui};

use gyroglove::{
    config::Config,
    constants::{ANALOG_MAX, CHANNEL_COUNT, FINGER_NAMES, PANEL_REFRESH_INTERVAL},
    log_error, log_info,
    service::{
        mapper::{percentage, ChannelFrame, ChannelSnapshot},
        serial::{frame_queue, SessionState},
        session::{SessionController, SessionKind, StopOutcome},
    },
    utility::{available_port_names, parse_key_binding},
};

use super::{
    get_current_style,
    theme::{ERROR_COLOR, PRESSED_COLOR, RELEASED_COLOR},
};

pub struct Application {
    config: Config,
    sessions: SessionController,
    frames: Option<Receiver<ChannelFrame>>,
    readings: [ChannelSnapshot; CHANNEL_COUNT],
    port_input: String,
    key_inputs: [String; CHANNEL_COUNT],
    detected_ports: Vec<String>,
    modal: Option<(String /* title */, String /* message */)>,
}

impl Default for Application {
    fn default() -> Self {
        let mut config = Config::default();

        config.load();

        Self::new(config, SessionController::default())
    }
}

impl Application {
    pub fn new(config: Config, sessions: SessionController) -> Self {
        Self {
            port_input: config.com_port.clone(),
            key_inputs: std::array::from_fn(|i| config.fingers[i].key.clone()),
            config,
            sessions,
            frames: None,
            readings: [ChannelSnapshot::default(); CHANNEL_COUNT],
            detected_ports: available_port_names(),
            modal: None,
        }
    }
}

impl eframe::App for Application {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        ctx.set_style(get_current_style());

        self.drain_frames();

        if ctx.input(|i| i.viewport().close_requested()) {
            self.stop_session(None);
        }

        let active = self.sessions.active_kind();
        let winding_down = self.sessions.is_winding_down();

        self.message_modal(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(match (active, self.sessions.state()) {
                    (Some(kind), SessionState::Connecting) => format!("Connecting ({})...", kind),
                    (Some(SessionKind::Acquisition), _) => "Running".to_string(),
                    (Some(SessionKind::Calibration), _) => "Calibrating".to_string(),
                    (None, _) if winding_down => "Waiting for the last session to let go...".to_string(),
                    (None, _) => "Idle".to_string(),
                });

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(self.config.file_path().display().to_string());
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("GyroGlove");

            ui.add_space(4.0);

            self.draw_port_row(ui, active);

            ui.separator();

            self.draw_fingers(ui, active);

            ui.separator();

            self.draw_session_buttons(ui, active);
        });

        // Keep polling the session's frames even without user input
        ctx.request_repaint_after(std::time::Duration::from_millis(PANEL_REFRESH_INTERVAL));
    }
}

impl Application {
    fn drain_frames(&mut self) {
        let Some(frames) = &self.frames else {
            return;
        };

        // Frames arrive in order, the last one is the freshest
        for frame in frames.try_iter() {
            self.readings = frame.channels;
        }
    }

    fn draw_port_row(&mut self, ui: &mut Ui, active: Option<SessionKind>) {
        ui.horizontal(|ui| {
            ui.label("Port:");

            ui.add_enabled(
                active.is_none(),
                egui::TextEdit::singleline(&mut self.port_input).desired_width(160.0),
            );

            egui::ComboBox::from_id_salt("detected_ports")
                .selected_text("Detected")
                .show_ui(ui, |ui| {
                    for port in &self.detected_ports {
                        ui.selectable_value(&mut self.port_input, port.clone(), port);
                    }
                });

            if ui.button("⟳").on_hover_text("Look for serial ports again").clicked() {
                self.detected_ports = available_port_names();
            }
        });
    }

    fn draw_fingers(&mut self, ui: &mut Ui, active: Option<SessionKind>) {
        egui::Grid::new("fingers")
            .num_columns(6)
            .spacing([12.0, 10.0])
            .striped(true)
            .show(ui, |ui| {
                ui.strong("Finger");
                ui.strong("Reading");
                ui.strong("Raw");
                ui.strong("Threshold");
                ui.strong("Key");
                ui.label("");
                ui.end_row();

                for index in 0..CHANNEL_COUNT {
                    self.draw_finger_row(ui, index, active);
                    ui.end_row();
                }
            });
    }

    fn draw_finger_row(&mut self, ui: &mut Ui, index: usize, active: Option<SessionKind>) {
        let channel = &self.config.fingers[index];
        let reading = self.readings[index];

        ui.label(format!("{} ({})", FINGER_NAMES[index], channel.name));

        let fill = if reading.pressed {
            PRESSED_COLOR
        } else {
            RELEASED_COLOR
        };

        ui.add(
            ProgressBar::new(reading.percentage as f32 / 100.0)
                .desired_width(220.0)
                .fill(fill)
                .show_percentage(),
        );

        ui.monospace(format!("{:>4}", reading.raw));

        ui.label(format!(
            "{} ({}%)",
            channel.threshold,
            percentage(channel.threshold)
        ));

        let key_input = &mut self.key_inputs[index];
        let key_known = key_input.trim().is_empty() || parse_key_binding(key_input).is_some();

        let text_edit = egui::TextEdit::singleline(key_input)
            .desired_width(64.0)
            .hint_text("none");

        let response = ui.add(if key_known {
            text_edit
        } else {
            text_edit.text_color(ERROR_COLOR)
        });

        if !key_known {
            response.on_hover_text("Unknown key, this finger will stay unbound");
        }

        // Committing needs a live reading, so only while the glove is being read
        let ok = ui
            .add_enabled(active.is_some(), egui::Button::new("OK"))
            .on_hover_text("Use the current reading as this finger's threshold")
            .on_disabled_hover_text("Start a session or calibration first");

        if ok.clicked() {
            self.commit_channel(index);
        }
    }

    fn draw_session_buttons(&mut self, ui: &mut Ui, active: Option<SessionKind>) {
        let winding_down = self.sessions.is_winding_down();

        ui.horizontal(|ui| {
            let idle = active.is_none() && !winding_down;
            let running = active == Some(SessionKind::Acquisition);
            let calibrating = active == Some(SessionKind::Calibration);

            if ui.add_enabled(idle, egui::Button::new("Start")).clicked() {
                self.start_session(SessionKind::Acquisition);
            }

            if ui.add_enabled(running, egui::Button::new("Stop")).clicked() {
                self.stop_session(Some(SessionKind::Acquisition));
            }

            ui.separator();

            if ui.add_enabled(idle, egui::Button::new("Calibrate")).clicked() {
                self.start_session(SessionKind::Calibration);
            }

            if ui
                .add_enabled(calibrating, egui::Button::new("Stop calibration"))
                .clicked()
            {
                self.stop_session(Some(SessionKind::Calibration));
            }

            ui.separator();

            if ui.button("Save").clicked() {
                self.save();
            }
        });
    }

    fn message_modal(&mut self, ctx: &Context) {
        let Some((title, message)) = &self.modal else {
            return;
        };

        let modal = egui::Modal::new(egui::Id::new("Message Modal")).show(ctx, |ui| {
            ui.set_width(320.0);
            ui.heading(title);
            ui.add_space(8.0);
            ui.label(RichText::new(message));
            ui.add_space(16.0);

            ui.button("Close").clicked()
        });

        if modal.inner || modal.should_close() {
            self.modal = None;
        }
    }

    fn start_session(&mut self, kind: SessionKind) {
        let mut session_config = self.config.session_config();

        session_config.port = self.port_input.trim().to_string();

        let (tx, rx) = frame_queue();

        let result = match kind {
            SessionKind::Acquisition => self.sessions.start(&session_config, tx),
            SessionKind::Calibration => self.sessions.start_calibration(&session_config, tx),
        };

        match result {
            Ok(_) => self.frames = Some(rx),
            Err(e) => self.modal = Some(("Could not start".to_string(), e.to_string())),
        }
    }

    fn stop_session(&mut self, kind: Option<SessionKind>) {
        let outcome = match kind {
            Some(SessionKind::Acquisition) => self.sessions.stop(),
            Some(SessionKind::Calibration) => self.sessions.stop_calibration(),
            None => self.sessions.shutdown(),
        };

        if outcome == StopOutcome::TerminationTimeout {
            self.modal = Some((
                "Session did not stop".to_string(),
                "The glove session did not stop in time and was abandoned. \
                 Held keys were released. A new session can start once it has let go of the port."
                    .to_string(),
            ));
        }

        self.frames = None;
    }

    fn commit_channel(&mut self, index: usize) {
        let threshold = self.readings[index].raw.clamp(0, ANALOG_MAX - 1);
        let key = self.key_inputs[index].clone();

        match self.config.commit_channel(index, &key, threshold) {
            Ok(_) => log_info!(
                "Threshold of `{}` set to {}, takes effect on the next start",
                self.config.fingers[index].name,
                threshold
            ),
            Err(e) => {
                log_error!("{}", e);

                self.modal = Some(("Could not save".to_string(), e.to_string()));
            }
        }
    }

    fn save(&mut self) {
        let result = self.config.save(&self.port_input, &self.key_inputs);

        self.modal = Some(match result {
            Ok(_) => ("Saved".to_string(), "Settings saved.".to_string()),
            Err(e) => {
                log_error!("{}", e);

                ("Could not save".to_string(), e.to_string())
            }
        });
    }
}
