// Library root for the matchmaking lobby core: wire protocol, session state
// machine, and the collaborators it owns (roster, countdown, handoff).

pub mod avatar;
pub mod channel;
pub mod controller;
pub mod countdown;
pub mod handoff;
pub mod presence;
pub mod protocol;
pub mod roster;
pub mod session;
pub mod view;
