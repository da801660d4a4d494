use egui::{self, Align2, Color32, CornerRadius, FontId, Sense, Stroke, StrokeKind, Ui, Widget};
use emath::{pos2, vec2};
use epaint::TextShape;

use chrono::{DateTime, Utc};

use crate::utilities::format_visit_date_short;

pub const ACCENT: Color32 = Color32::from_rgb(0, 196, 106);

/// One entry in the visited-cities list: flag, name, date chip. The whole
/// row is clickable; the caller wires the click to navigation.
pub struct CityRow<'a> {
    pub emoji: &'a str,
    pub name: &'a str,
    pub date: DateTime<Utc>,
    pub selected: bool,
}

impl<'a> CityRow<'a> {
    pub fn new(emoji: &'a str, name: &'a str, date: DateTime<Utc>, selected: bool) -> Self {
        Self { emoji, name, date, selected }
    }
}

impl Widget for CityRow<'_> {
    fn ui(self, ui: &mut Ui) -> egui::Response {
        let desired_size = vec2(ui.available_width(), 44.0);
        let (rect, response) = ui.allocate_exact_size(desired_size, Sense::click());
        let painter = ui.painter_at(rect);

        let fill = if response.hovered() {
            Color32::from_black_alpha(95)
        } else {
            Color32::from_black_alpha(60)
        };
        painter.rect_filled(rect, CornerRadius::same(10), fill);

        if self.selected {
            painter.rect_stroke(
                rect,
                CornerRadius::same(10),
                Stroke::new(1.5, ACCENT),
                StrokeKind::Inside,
            );
        }

        painter.text(
            pos2(rect.left() + 12.0, rect.center().y),
            Align2::LEFT_CENTER,
            self.emoji,
            FontId::proportional(18.0),
            Color32::WHITE,
        );

        let name_color = Color32::from_white_alpha(220);
        let name_galley = ui.fonts_mut(|f| {
            f.layout_no_wrap(self.name.to_string(), FontId::proportional(16.0), name_color)
        });

        let date_color = Color32::from_white_alpha(130);
        let date_galley = ui.fonts_mut(|f| {
            f.layout_no_wrap(
                format!("({})", format_visit_date_short(self.date)),
                FontId::proportional(13.0),
                date_color,
            )
        });

        let name_pos = pos2(
            rect.left() + 44.0,
            rect.center().y - name_galley.size().y * 0.5,
        );
        let date_pos = pos2(
            rect.right() - 12.0 - date_galley.size().x,
            rect.center().y - date_galley.size().y * 0.5,
        );

        painter.add(TextShape::new(name_pos, name_galley, name_color));
        painter.add(TextShape::new(date_pos, date_galley, date_color));

        response
    }
}

/// One entry in the countries list, derived from the visited cities.
pub struct CountryRow<'a> {
    pub emoji: &'a str,
    pub name: &'a str,
}

impl<'a> CountryRow<'a> {
    pub fn new(emoji: &'a str, name: &'a str) -> Self {
        Self { emoji, name }
    }
}

impl Widget for CountryRow<'_> {
    fn ui(self, ui: &mut Ui) -> egui::Response {
        let desired_size = vec2(ui.available_width(), 36.0);
        let (rect, response) = ui.allocate_exact_size(desired_size, Sense::hover());
        let painter = ui.painter_at(rect);

        painter.rect_filled(rect, CornerRadius::same(8), Color32::from_black_alpha(50));

        painter.text(
            pos2(rect.left() + 12.0, rect.center().y),
            Align2::LEFT_CENTER,
            self.emoji,
            FontId::proportional(16.0),
            Color32::WHITE,
        );

        let name_color = Color32::from_white_alpha(200);
        let name_galley = ui.fonts_mut(|f| {
            f.layout_no_wrap(self.name.to_string(), FontId::proportional(14.0), name_color)
        });

        let name_pos = pos2(
            rect.left() + 44.0,
            rect.center().y - name_galley.size().y * 0.5,
        );
        painter.add(TextShape::new(name_pos, name_galley, name_color));

        response
    }
}
