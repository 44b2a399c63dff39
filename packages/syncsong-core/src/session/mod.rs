//! Sessions, their members and the registry that owns them.
//!
//! A [`Session`] is plain data; every mutation goes through the
//! [`Registry`], which applies one inbound message at a time and fans the
//! result out to member outboxes.

mod queue;
mod registry;

pub use queue::Queue;
pub use registry::{CodeGenerator, Outbox, Registry, RegistryStats, SessionRegistry};

use crate::model::{MemberId, MemberInfo, NowPlaying, SessionSnapshot};

/// A connection that has created or joined a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: MemberId,
    pub display_name: String,
}

/// A shared listening room.
#[derive(Debug, Clone)]
pub struct Session {
    pub code: String,
    pub host_user_id: MemberId,
    pub allow_guest_control: bool,
    pub party_mode: bool,
    /// Members in join order.
    members: Vec<Member>,
    pub queue: Queue,
    pub now_playing: Option<NowPlaying>,
}

impl Session {
    /// Creates a session with `host` as its only member.
    pub fn new(code: String, host: Member) -> Self {
        Self {
            code,
            host_user_id: host.user_id.clone(),
            allow_guest_control: false,
            party_mode: false,
            members: vec![host],
            queue: Queue::new(),
            now_playing: None,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Adds a member, or renames it when already present.
    pub fn upsert_member(&mut self, member: Member) {
        match self.members.iter_mut().find(|m| m.user_id == member.user_id) {
            Some(existing) => existing.display_name = member.display_name,
            None => self.members.push(member),
        }
    }

    pub fn remove_member(&mut self, user_id: &str) -> Option<Member> {
        let index = self.members.iter().position(|m| m.user_id == user_id)?;
        Some(self.members.remove(index))
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_user_id == user_id
    }

    /// Whether `user_id` may mutate the queue, publish state and send controls.
    ///
    /// Evaluated per operation since `allow_guest_control` can flip at any time.
    pub fn can_control(&self, user_id: &str) -> bool {
        self.is_host(user_id) || self.allow_guest_control
    }

    /// Clears `now_playing` if it refers to `queue_id`.
    pub fn clear_now_playing_if(&mut self, queue_id: &str) {
        if self
            .now_playing
            .as_ref()
            .and_then(|np| np.queue_id.as_deref())
            == Some(queue_id)
        {
            self.now_playing = None;
        }
    }

    /// Builds the full state snapshot broadcast on create/join/roster change.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.code.clone(),
            host_user_id: self.host_user_id.clone(),
            allow_guest_control: self.allow_guest_control,
            party_mode: self.party_mode,
            members: self
                .members
                .iter()
                .map(|m| MemberInfo {
                    user_id: m.user_id.clone(),
                    display_name: m.display_name.clone(),
                })
                .collect(),
            queue: self.queue.items().to_vec(),
            now_playing: self.now_playing.clone(),
        }
    }
}
