pub type InactivityScore = u64;
pub type ParticipationFlags = u8;
