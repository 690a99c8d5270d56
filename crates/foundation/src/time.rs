/// Host clock timestamp, in seconds.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64);

impl Time {
    /// Animation-frame callbacks report milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        Self(ms / 1000.0)
    }

    pub fn as_millis(self) -> f64 {
        self.0 * 1000.0
    }

    pub fn add_millis(self, ms: f64) -> Self {
        Self(self.0 + ms / 1000.0)
    }

    /// Milliseconds elapsed since `earlier`; negative if `earlier` is later.
    pub fn millis_since(self, earlier: Time) -> f64 {
        (self.0 - earlier.0) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn millis_conversions() {
        let t = Time::from_millis(1500.0);
        assert_eq!(t, Time(1.5));
        assert_eq!(t.as_millis(), 1500.0);
        assert_eq!(t.add_millis(500.0), Time(2.0));
        assert_eq!(Time(2.0).millis_since(t), 500.0);
    }
}
