use ratatui::style::{Color, Modifier, Style};

/// Widget palette. Every foreground is faded toward `background` by the
/// current opacity, which stands in for window translucency.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Color,
    pub download: Color,
    pub upload: Color,
    pub unit: Color,
    pub loss: Color,
    pub text_dim: Color,
    pub accent: Color,
    opacity: f64,
}

impl Theme {
    pub fn new(opacity: f64) -> Self {
        Self {
            background: Color::Rgb(0, 0, 0),
            download: Color::Rgb(0, 255, 0),
            upload: Color::Rgb(0, 255, 255),
            unit: Color::Rgb(236, 248, 248),
            loss: Color::Rgb(255, 0, 0),
            text_dim: Color::Rgb(120, 120, 145),
            accent: Color::Rgb(99, 179, 237),
            opacity,
        }
    }

    /// `color` blended toward the background by the opacity.
    pub fn faded(&self, color: Color) -> Color {
        blend(color, self.background, self.opacity)
    }

    pub fn fg(&self, color: Color) -> Style {
        Style::default()
            .fg(self.faded(color))
            .bg(self.background)
    }

    pub fn value(&self, color: Color) -> Style {
        self.fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn dim(&self) -> Style {
        self.fg(self.text_dim)
    }
}

/// Linear mix: `alpha` of `fg` over `bg`. Non-RGB colors pass through.
pub fn blend(fg: Color, bg: Color, alpha: f64) -> Color {
    let alpha = alpha.clamp(0.0, 1.0);
    match (fg, bg) {
        (Color::Rgb(fr, fg_, fb), Color::Rgb(br, bg_, bb)) => {
            let mix = |f: u8, b: u8| -> u8 {
                (f64::from(f) * alpha + f64::from(b) * (1.0 - alpha)).round() as u8
            };
            Color::Rgb(mix(fr, br), mix(fg_, bg_), mix(fb, bb))
        }
        _ => fg,
    }
}
