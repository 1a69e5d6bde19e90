use eframe::egui::{self, Color32};

const TEXT_COLOR: Color32 = Color32::from_rgb(214, 219, 230);
const ACCENT_COLOR: Color32 = Color32::from_rgb(118, 196, 173);
const WARNING_COLOR: Color32 = Color32::from_rgb(236, 160, 120);
const OUTLINE_COLOR: Color32 = Color32::from_rgb(96, 104, 128);
const RAISED_COLOR: Color32 = Color32::from_rgb(52, 56, 74);
const SURFACE_COLOR: Color32 = Color32::from_rgb(38, 41, 56);
const BASE_COLOR: Color32 = Color32::from_rgb(27, 29, 40);

/// Bar fill of a finger that currently counts as pressed.
pub const PRESSED_COLOR: Color32 = ACCENT_COLOR;
pub const RELEASED_COLOR: Color32 = OUTLINE_COLOR;
pub const ERROR_COLOR: Color32 = WARNING_COLOR;

pub fn get_current_style() -> egui::Style {
    let mut style = egui::Style::default();
    let old = style.visuals.clone();

    // ---------- Text styles ----------

    for text_style in [egui::TextStyle::Button, egui::TextStyle::Body] {
        style.text_styles.insert(
            text_style,
            egui::FontId::new(15.0, egui::FontFamily::Proportional),
        );
    }

    // ---------- Visual styles ----------

    style.visuals = egui::Visuals {
        dark_mode: true,
        override_text_color: Some(TEXT_COLOR),
        extreme_bg_color: BASE_COLOR,
        faint_bg_color: SURFACE_COLOR,
        window_fill: SURFACE_COLOR,
        panel_fill: BASE_COLOR,
        selection: egui::style::Selection {
            bg_fill: ACCENT_COLOR.gamma_multiply(0.6),
            stroke: egui::Stroke::new(1.0, TEXT_COLOR),
        },
        widgets: egui::style::Widgets {
            noninteractive: widget_visual(old.widgets.noninteractive, BASE_COLOR),
            inactive: widget_visual(old.widgets.inactive, RAISED_COLOR),
            hovered: widget_visual(old.widgets.hovered, OUTLINE_COLOR),
            active: widget_visual(old.widgets.active, ACCENT_COLOR.gamma_multiply(0.5)),
            open: widget_visual(old.widgets.open, RAISED_COLOR),
        },
        ..old
    };

    // ---------- Spacing styles ----------

    style.spacing.button_padding = egui::vec2(10.0, 6.0);
    style.spacing.item_spacing = egui::vec2(10.0, 8.0);

    style
}

fn widget_visual(old: egui::style::WidgetVisuals, fill: Color32) -> egui::style::WidgetVisuals {
    egui::style::WidgetVisuals {
        bg_fill: fill,
        weak_bg_fill: fill,
        bg_stroke: egui::Stroke::new(1.0, OUTLINE_COLOR),
        fg_stroke: egui::Stroke::new(1.0, TEXT_COLOR),
        ..old
    }
}
