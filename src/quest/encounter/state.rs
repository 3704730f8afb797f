use super::{EncounterRecord, Participant};
use crate::quest::{Rejection, format_wait};
use ahash::AHashMap;
use chrono::{DateTime, Utc};

/// Contents of the single encounter slot plus the per-channel cooldowns it enforces.
#[derive(Debug, Default)]
pub struct SlotState {
    pub active: Option<EncounterRecord>,
    pub channel_cooldowns: AHashMap<String, DateTime<Utc>>,
}

impl SlotState {
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn check_channel(&self, channel: &str, now: DateTime<Utc>) -> Result<(), Rejection> {
        match self.channel_cooldowns.get(channel) {
            Some(until) if *until > now => Err(Rejection::ChannelCooldown(format_wait(*until - now))),
            _ => Ok(()),
        }
    }

    /// Idle → Open.
    pub fn open(&mut self, record: EncounterRecord) -> Result<&EncounterRecord, Rejection> {
        if self.active.is_some() {
            return Err(Rejection::EncounterAlreadyOpen);
        }
        Ok(self.active.insert(record))
    }

    /// Validates a join without changing anything.
    pub fn can_join(&self, who: &str, channel: &str, now: DateTime<Utc>, max: usize) -> Result<(), Rejection> {
        let Some(active) = self.active.as_ref() else {
            return Err(Rejection::NoOpenEncounter);
        };
        if now > active.close_epoch {
            return Err(Rejection::NoOpenEncounter);
        }
        if active.channel != channel {
            return Err(Rejection::WrongChannel);
        }
        if active.has_participant(who) {
            return Err(Rejection::AlreadyJoined);
        }
        if active.participants.len() >= max {
            return Err(Rejection::EncounterFull);
        }
        Ok(())
    }

    /// Adds a participant; `can_join` must have passed under the same guard.
    pub fn add(&mut self, participant: Participant) -> usize {
        match self.active.as_mut() {
            Some(active) => {
                active.participants.push(participant);
                active.participants.len()
            }
            None => 0,
        }
    }

    /// Open → Resolving for an expired window. `None` when idle or still open.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Option<EncounterRecord> {
        if self.active.as_ref().is_some_and(|a| now > a.close_epoch) {
            self.active.take()
        } else {
            None
        }
    }

    /// Open → Resolving for a specific encounter, whatever its window says.
    pub fn take_if(&mut self, id: u64) -> Option<EncounterRecord> {
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            self.active.take()
        } else {
            None
        }
    }

    pub fn set_cooldown(&mut self, channel: &str, until: DateTime<Utc>) {
        self.channel_cooldowns.insert(channel.to_string(), until);
    }

    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>) {
        self.channel_cooldowns.retain(|_, until| *until > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::encounter::{EncounterKind, Foe};
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> EncounterRecord {
        EncounterRecord {
            id: 7,
            kind: EncounterKind::Mob,
            channel: "general".to_string(),
            foe: Foe { name: "Rat".to_string(), level: 3, xp_min: 10, xp_max: 20, legacy: None },
            participants: vec![Participant { id: "1".to_string(), name: "ana".to_string() }],
            opened_at: now,
            close_epoch: now + Duration::seconds(60),
            xp_multiplier: 1.0,
        }
    }

    #[test]
    fn only_one_open_at_a_time() {
        let now = Utc::now();
        let mut slot = SlotState::default();
        assert!(slot.open(record(now)).is_ok());
        assert_eq!(slot.open(record(now)).err(), Some(Rejection::EncounterAlreadyOpen));
    }

    #[test]
    fn join_rules() {
        let now = Utc::now();
        let mut slot = SlotState::default();
        assert_eq!(slot.can_join("2", "general", now, 10), Err(Rejection::NoOpenEncounter));
        slot.open(record(now)).unwrap();
        assert_eq!(slot.can_join("1", "general", now, 10), Err(Rejection::AlreadyJoined));
        assert_eq!(slot.can_join("2", "other", now, 10), Err(Rejection::WrongChannel));
        assert_eq!(slot.can_join("2", "general", now, 1), Err(Rejection::EncounterFull));
        assert_eq!(slot.can_join("2", "general", now + Duration::seconds(61), 10), Err(Rejection::NoOpenEncounter));
        assert!(slot.can_join("2", "general", now, 10).is_ok());
    }

    #[test]
    fn expiry_and_targeted_take_are_idempotent() {
        let now = Utc::now();
        let mut slot = SlotState::default();
        slot.open(record(now)).unwrap();
        assert!(slot.take_expired(now).is_none());
        assert!(slot.take_if(8).is_none());
        assert!(slot.take_expired(now + Duration::seconds(61)).is_some());
        assert!(slot.take_if(7).is_none());
        assert!(slot.is_idle());
    }

    #[test]
    fn channel_cooldown_blocks_until_expiry() {
        let now = Utc::now();
        let mut slot = SlotState::default();
        slot.set_cooldown("general", now + Duration::seconds(30));
        assert!(matches!(slot.check_channel("general", now), Err(Rejection::ChannelCooldown(_))));
        assert!(slot.check_channel("general", now + Duration::seconds(30)).is_ok());
        assert!(slot.check_channel("elsewhere", now).is_ok());
    }
}
