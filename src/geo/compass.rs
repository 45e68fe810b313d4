/// Translates numeric headings to 8-point compass labels (N, NE, E, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompassPoint {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl std::fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl CompassPoint {
    /// Each point covers 45 degrees centered on its direction.
    pub fn from_heading(heading: f64) -> Self {
        let normalized = heading.rem_euclid(360.0);
        match normalized {
            h if h < 22.5 => CompassPoint::N,
            h if h < 67.5 => CompassPoint::NE,
            h if h < 112.5 => CompassPoint::E,
            h if h < 157.5 => CompassPoint::SE,
            h if h < 202.5 => CompassPoint::S,
            h if h < 247.5 => CompassPoint::SW,
            h if h < 292.5 => CompassPoint::W,
            h if h < 337.5 => CompassPoint::NW,
            _ => CompassPoint::N,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::NE => "NE",
            CompassPoint::E => "E",
            CompassPoint::SE => "SE",
            CompassPoint::S => "S",
            CompassPoint::SW => "SW",
            CompassPoint::W => "W",
            CompassPoint::NW => "NW",
        }
    }
}
