//! Desktop notifications and warning sounds

use curfew_host_api::{AudioCue, AudioPlayer, HostError, HostResult, Notifier};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

const APP_NAME: &str = "curfew";

/// Shows notifications with `notify-send`
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            program: "notify-send".into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn show(&self, title: &str, message: &str) -> HostResult<()> {
        let status = Command::new(&self.program)
            .args(["--app-name", APP_NAME, "--urgency", "critical", title, message])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                HostError::NotificationFailed(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !status.success() {
            return Err(HostError::NotificationFailed(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        debug!(title, "Notification shown");
        Ok(())
    }
}

/// Plays warning sounds from a directory with the first available player
pub struct SoundPlayer {
    sounds_dir: PathBuf,
    players: Vec<String>,
}

impl SoundPlayer {
    pub fn new(sounds_dir: impl Into<PathBuf>) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
            players: vec!["paplay".into(), "aplay".into()],
        }
    }

    pub fn sound_path(&self, cue: AudioCue) -> PathBuf {
        self.sounds_dir.join(cue.file_name())
    }
}

impl AudioPlayer for SoundPlayer {
    fn play(&self, cue: AudioCue) -> HostResult<()> {
        let path = self.sound_path(cue);
        if !path.is_file() {
            return Err(HostError::AudioFailed(format!(
                "Sound file not found: {}",
                path.display()
            )));
        }

        let mut last_error = None;
        for player in &self.players {
            match Command::new(player)
                .arg(&path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(mut child) => {
                    // Reaped off-thread; playback must not block
                    std::thread::spawn(move || child.wait());
                    debug!(player = %player, cue = ?cue, "Playing sound");
                    return Ok(());
                }
                Err(e) => last_error = Some(format!("{}: {}", player, e)),
            }
        }

        Err(HostError::AudioFailed(
            last_error.unwrap_or_else(|| "No audio player configured".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sound_file() {
        let dir = tempfile::tempdir().unwrap();
        let player = SoundPlayer::new(dir.path());
        assert!(matches!(
            player.play(AudioCue::Final),
            Err(HostError::AudioFailed(_))
        ));
        assert_eq!(
            player.sound_path(AudioCue::Standard),
            dir.path().join("alarm.wav")
        );
    }

    #[test]
    fn test_no_player_available() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alarm.wav"), b"RIFF").unwrap();
        let player = SoundPlayer {
            sounds_dir: dir.path().to_path_buf(),
            players: vec!["curfew-no-such-player".into()],
        };
        assert!(player.play(AudioCue::Standard).is_err());
    }

    #[test]
    fn test_missing_notifier_binary() {
        let notifier = DesktopNotifier {
            program: "curfew-no-such-notifier".into(),
        };
        assert!(matches!(
            notifier.show("t", "m"),
            Err(HostError::NotificationFailed(_))
        ));
    }
}
