use crate::error::CommandError;
use std::time::Duration;

/// A single dispatchable action for the toy. Constructed by a producer,
/// consumed exactly once by the dispatcher.
///
/// Fields are wider than the accepted ranges so that out-of-range values
/// coming off the wire survive until [`Command::validate`] can reject them
/// with a proper `InvalidParameter` instead of being silently truncated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Roll in a direction. Heading 0-359 degrees, speed 0-255.
    Roll { heading: u16, speed: u16, duration: f32 },
    /// Spin in place. 0-360 degrees.
    Spin { degrees: u16, duration: f32 },
    /// Set the main LED color, 0-255 per channel.
    SetColor { r: u16, g: u16, b: u16 },
}

impl Command {
    /// Checks parameter ranges. Called by the dispatcher before any device
    /// call; a command that fails here never reaches the adapter.
    pub fn validate(&self) -> Result<(), CommandError> {
        match *self {
            Command::Roll {
                heading,
                speed,
                duration,
            } => {
                if heading > 359 {
                    return Err(CommandError::InvalidParameter(format!(
                        "heading {heading} out of range 0-359"
                    )));
                }
                if speed > 255 {
                    return Err(CommandError::InvalidParameter(format!(
                        "speed {speed} out of range 0-255"
                    )));
                }
                validate_duration(duration)
            }
            Command::Spin { degrees, duration } => {
                if degrees > 360 {
                    return Err(CommandError::InvalidParameter(format!(
                        "degrees {degrees} out of range 0-360"
                    )));
                }
                validate_duration(duration)
            }
            Command::SetColor { r, g, b } => {
                for (channel, value) in [("r", r), ("g", g), ("b", b)] {
                    if value > 255 {
                        return Err(CommandError::InvalidParameter(format!(
                            "color channel {channel}={value} out of range 0-255"
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// How long the toy is busy executing this command.
    pub fn duration(&self) -> Duration {
        match *self {
            Command::Roll { duration, .. } | Command::Spin { duration, .. } => {
                Duration::from_secs_f32(duration.max(0.0))
            }
            Command::SetColor { .. } => Duration::ZERO,
        }
    }

    /// Human-readable success message, mirrored to the UI as a status event.
    pub fn describe(&self) -> String {
        match *self {
            Command::Roll { heading, speed, .. } => {
                format!("Rolling with heading {heading}, speed {speed}")
            }
            Command::Spin { degrees, .. } => format!("Spinning {degrees} degrees"),
            Command::SetColor { r, g, b } => format!("Color set to RGB({r},{g},{b})"),
        }
    }
}

fn validate_duration(duration: f32) -> Result<(), CommandError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(CommandError::InvalidParameter(format!(
            "duration {duration} must be a positive number of seconds"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_commands_pass() {
        assert!(
            Command::Roll {
                heading: 90,
                speed: 200,
                duration: 1.0
            }
            .validate()
            .is_ok()
        );
        assert!(
            Command::Spin {
                degrees: 360,
                duration: 2.0
            }
            .validate()
            .is_ok()
        );
        assert!(Command::SetColor { r: 0, g: 128, b: 255 }.validate().is_ok());
    }

    #[test]
    fn out_of_range_color_is_invalid() {
        let err = Command::SetColor { r: 300, g: 0, b: 0 }.validate().unwrap_err();
        assert!(matches!(err, CommandError::InvalidParameter(_)));
    }

    #[test]
    fn out_of_range_heading_and_speed_are_invalid() {
        assert!(matches!(
            Command::Roll {
                heading: 360,
                speed: 10,
                duration: 1.0
            }
            .validate(),
            Err(CommandError::InvalidParameter(_))
        ));
        assert!(matches!(
            Command::Roll {
                heading: 0,
                speed: 256,
                duration: 1.0
            }
            .validate(),
            Err(CommandError::InvalidParameter(_))
        ));
    }

    #[test]
    fn non_positive_duration_is_invalid() {
        for duration in [0.0, -1.0, f32::NAN] {
            assert!(matches!(
                Command::Spin { degrees: 90, duration }.validate(),
                Err(CommandError::InvalidParameter(_))
            ));
        }
    }
}
