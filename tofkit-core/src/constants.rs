//! Physical constants and unit conversions.
//!
//! Times are in microseconds, distances in metres, wavelengths in ångström and
//! speeds in metres per second throughout the workspace.

/// Planck constant (J s).
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Neutron mass (kg).
pub const NEUTRON_MASS: f64 = 1.674_927_498_04e-27;

/// Microseconds per second.
pub const MICROS_PER_SECOND: f64 = 1.0e6;

/// Nanoseconds per microsecond.
pub const NANOS_PER_MICRO: f64 = 1.0e3;

/// Flight time of a 1 Å neutron over 1 m, in microseconds (`m_n / h`, rescaled).
pub const MICROS_PER_METRE_ANGSTROM: f64 = NEUTRON_MASS / PLANCK * 1.0e-10 * MICROS_PER_SECOND;

/// Speed (m/s) of a neutron with the given wavelength (Å).
#[inline]
#[must_use]
pub fn speed_from_wavelength(wavelength: f64) -> f64 {
    PLANCK / (NEUTRON_MASS * wavelength * 1.0e-10)
}

/// Wavelength (Å) of a neutron travelling at the given speed (m/s).
#[inline]
#[must_use]
pub fn wavelength_from_speed(speed: f64) -> f64 {
    PLANCK / (NEUTRON_MASS * speed) * 1.0e10
}

/// Time-of-flight (µs) over `distance` (m) for a neutron of `wavelength` (Å).
#[inline]
#[must_use]
pub fn tof_from_wavelength(distance: f64, wavelength: f64) -> f64 {
    distance * MICROS_PER_METRE_ANGSTROM * wavelength
}

/// Wavelength (Å) of a neutron that covered `distance` (m) in `tof` (µs).
#[inline]
#[must_use]
pub fn wavelength_from_tof(distance: f64, tof: f64) -> f64 {
    tof / (distance * MICROS_PER_METRE_ANGSTROM)
}

/// Time (µs) needed to cover `distance` (m) at `speed` (m/s).
#[inline]
#[must_use]
pub fn flight_time(distance: f64, speed: f64) -> f64 {
    distance / speed * MICROS_PER_SECOND
}

/// Pulsed neutron sources with known pulse parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Facility {
    /// European Spallation Source (14 Hz, 2.86 ms long pulse).
    #[default]
    Ess,
}

impl Facility {
    /// Source repetition rate (Hz).
    #[must_use]
    pub fn pulse_frequency(self) -> f64 {
        match self {
            Self::Ess => 14.0,
        }
    }

    /// Time between consecutive pulse starts (µs).
    #[must_use]
    pub fn pulse_period(self) -> f64 {
        MICROS_PER_SECOND / self.pulse_frequency()
    }

    /// Nominal proton pulse length (µs).
    #[must_use]
    pub fn pulse_length(self) -> f64 {
        match self {
            Self::Ess => 2860.0,
        }
    }
}
