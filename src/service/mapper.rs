use crate::{
    config::{AbsentChannels, ChannelConfig},
    constants::{ANALOG_MAX, CHANNEL_COUNT},
    service::decoder::Telegram,
};

/// Derived state of one finger channel for one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub raw: i32,
    pub percentage: u8,
    pub pressed: bool,
}

impl ChannelSnapshot {
    pub fn from_raw(raw: i32, threshold: i32) -> Self {
        Self {
            raw,
            percentage: percentage(raw),
            pressed: raw < threshold,
        }
    }
}

/// A bent finger reads low, so the percentage is inverted: 0 raw is 100%.
pub fn percentage(raw: i32) -> u8 {
    let scaled = (100 * raw as i64).div_euclid(ANALOG_MAX as i64);

    (100 - scaled).clamp(0, 100) as u8
}

/// All five channels as published for one line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrame {
    pub channels: [ChannelSnapshot; CHANNEL_COUNT],
    /// Which channels were present in the line this frame came from
    pub fresh: [bool; CHANNEL_COUNT],
}

impl ChannelFrame {
    /// `(percentage, raw)` per channel, in channel order.
    pub fn readings(&self) -> [(u8, i32); CHANNEL_COUNT] {
        std::array::from_fn(|i| (self.channels[i].percentage, self.channels[i].raw))
    }
}

/// Maps telegrams onto per-channel snapshots using thresholds fixed at construction.
#[derive(Debug, Clone)]
pub struct ChannelMapper {
    names: [String; CHANNEL_COUNT],
    thresholds: [i32; CHANNEL_COUNT],
    absent: AbsentChannels,
    last: [ChannelSnapshot; CHANNEL_COUNT],
}

impl ChannelMapper {
    pub fn new(channels: &[ChannelConfig; CHANNEL_COUNT], absent: AbsentChannels) -> Self {
        Self {
            names: std::array::from_fn(|i| channels[i].name.clone()),
            thresholds: std::array::from_fn(|i| channels[i].threshold),
            absent,
            last: [ChannelSnapshot::default(); CHANNEL_COUNT],
        }
    }

    /// Frame for this telegram, or `None` when it carried none of the channel tags.
    ///
    /// Channels missing from the telegram are never re-evaluated: with
    /// [`AbsentChannels::Hold`] they repeat their previous snapshot, with
    /// [`AbsentChannels::Zero`] they are reported as a zero reading. Either way
    /// they are flagged as not fresh so no input is driven from them.
    pub fn map(&mut self, telegram: &Telegram) -> Option<ChannelFrame> {
        let mut frame = ChannelFrame::default();

        for (i, name) in self.names.iter().enumerate() {
            match telegram.get(name) {
                Some(raw) => {
                    self.last[i] = ChannelSnapshot::from_raw(raw, self.thresholds[i]);
                    frame.fresh[i] = true;
                    frame.channels[i] = self.last[i];
                }
                None => {
                    frame.channels[i] = match self.absent {
                        AbsentChannels::Hold => self.last[i],
                        AbsentChannels::Zero => ChannelSnapshot::default(),
                    };
                }
            }
        }

        if !frame.fresh.iter().any(|&fresh| fresh) {
            return None;
        }

        Some(frame)
    }

    pub fn last(&self) -> &[ChannelSnapshot; CHANNEL_COUNT] {
        &self.last
    }
}
