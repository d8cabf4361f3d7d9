const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// The channel voice messages the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
}

impl MidiMessage {
    /// Decodes a raw message. A note-on with velocity 0 is a note-off;
    /// anything other than note-on/off yields `None`.
    pub fn parse(data: &[u8]) -> Option<MidiMessage> {
        let &[status, pitch, velocity, ..] = data else {
            return None;
        };
        let channel = status & 0x0F;

        match status & 0xF0 {
            NOTE_ON if velocity > 0 => Some(MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            }),
            NOTE_OFF | NOTE_ON => Some(MidiMessage::NoteOff {
                channel,
                pitch,
                velocity,
            }),
            _ => None,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => [NOTE_ON | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff {
                channel,
                pitch,
                velocity,
            } => [NOTE_OFF | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F],
        }
    }

    pub fn channel(self) -> u8 {
        match self {
            MidiMessage::NoteOn { channel, .. } | MidiMessage::NoteOff { channel, .. } => channel,
        }
    }

    pub fn pitch(self) -> u8 {
        match self {
            MidiMessage::NoteOn { pitch, .. } | MidiMessage::NoteOff { pitch, .. } => pitch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_velocity_note_on_is_a_release() {
        assert_eq!(
            MidiMessage::parse(&[0x93, 60, 0]),
            Some(MidiMessage::NoteOff { channel: 3, pitch: 60, velocity: 0 })
        );
        assert_eq!(
            MidiMessage::parse(&[0x93, 60, 1]),
            Some(MidiMessage::NoteOn { channel: 3, pitch: 60, velocity: 1 })
        );
    }

    #[test]
    fn ignores_other_messages() {
        assert_eq!(MidiMessage::parse(&[0xB0, 7, 100]), None);
        assert_eq!(MidiMessage::parse(&[0xF8]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[]), None);
    }

    #[test]
    fn encodes_status_with_channel() {
        let on = MidiMessage::NoteOn { channel: 9, pitch: 36, velocity: 127 };
        assert_eq!(on.to_bytes(), [0x99, 36, 127]);
        let off = MidiMessage::NoteOff { channel: 0, pitch: 36, velocity: 0 };
        assert_eq!(off.to_bytes(), [0x80, 36, 0]);
    }
}
