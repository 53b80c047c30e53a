//! Room actor
//!
//! Each room is its own task owning its member mapping. Joins, leaves,
//! chat messages and queries arrive on separate queues; the loop handles one
//! event at a time to completion. Fan-out never waits on a member's mailbox.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::account::{Member, MemberView};
use crate::error::{AppError, DeliveryError};
use crate::message::ChatMessage;
use crate::protocol::{JoinEvent, LeaveEvent, RoomQuery};
use crate::types::{ConnectionId, RoomName};

/// Cheap-to-clone handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    joins: mpsc::Sender<JoinEvent>,
    leaves: mpsc::Sender<LeaveEvent>,
    messages: mpsc::Sender<ChatMessage>,
    queries: mpsc::Sender<RoomQuery>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Whether both handles address the same room instance
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.messages.same_channel(&other.messages)
    }

    /// Queue a join; the returned receiver fires once it is processed
    pub async fn join(&self, member: Member) -> Result<oneshot::Receiver<()>, AppError> {
        let (done, rx) = oneshot::channel();
        self.joins
            .send(JoinEvent { member, done })
            .await
            .map_err(|_| self.gone())?;
        Ok(rx)
    }

    /// Queue a leave; the returned receiver fires once it is processed
    pub async fn leave(
        &self,
        username: String,
        connection: ConnectionId,
    ) -> Result<oneshot::Receiver<()>, AppError> {
        let (done, rx) = oneshot::channel();
        self.leaves
            .send(LeaveEvent {
                username,
                connection,
                done,
            })
            .await
            .map_err(|_| self.gone())?;
        Ok(rx)
    }

    /// Broadcast a message to every member except its sender
    pub async fn send(&self, msg: ChatMessage) -> Result<(), AppError> {
        self.messages.send(msg).await.map_err(|_| self.gone())
    }

    pub async fn roster(&self) -> Result<Vec<MemberView>, AppError> {
        let (respond_to, rx) = oneshot::channel();
        self.queries
            .send(RoomQuery::Roster { respond_to })
            .await
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn rename(&self, username: String, nickname: String) -> Result<(), AppError> {
        self.queries
            .send(RoomQuery::Rename { username, nickname })
            .await
            .map_err(|_| self.gone())
    }

    fn gone(&self) -> AppError {
        AppError::RoomNotFound(self.name.to_string())
    }
}

/// Inbound queues of one room
struct RoomInbox {
    joins: mpsc::Receiver<JoinEvent>,
    leaves: mpsc::Receiver<LeaveEvent>,
    messages: mpsc::Receiver<ChatMessage>,
    queries: mpsc::Receiver<RoomQuery>,
}

/// Room state, owned by the room task
pub struct Room {
    name: RoomName,
    /// username -> member
    members: HashMap<String, Member>,
}

impl Room {
    /// Start a room task and return its handle
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(name: RoomName, queue_capacity: usize) -> RoomHandle {
        let (joins, joins_rx) = mpsc::channel(queue_capacity);
        let (leaves, leaves_rx) = mpsc::channel(queue_capacity);
        let (messages, messages_rx) = mpsc::channel(queue_capacity);
        let (queries, queries_rx) = mpsc::channel(queue_capacity);

        let inbox = RoomInbox {
            joins: joins_rx,
            leaves: leaves_rx,
            messages: messages_rx,
            queries: queries_rx,
        };
        let room = Room {
            name: name.clone(),
            members: HashMap::new(),
        };
        tokio::spawn(room.run(inbox));

        RoomHandle {
            name,
            joins,
            leaves,
            messages,
            queries,
        }
    }

    /// Run the room event loop until every handle is dropped
    ///
    /// Ready queues are picked at random; only each queue's own order is kept.
    async fn run(mut self, mut inbox: RoomInbox) {
        debug!("Room {} started", self.name);

        loop {
            tokio::select! {
                Some(event) = inbox.joins.recv() => self.on_join(event),
                Some(event) = inbox.leaves.recv() => self.on_leave(event),
                Some(msg) = inbox.messages.recv() => self.on_message(msg),
                Some(query) = inbox.queries.recv() => self.on_query(query),
                else => break,
            }
        }

        debug!("Room {} stopped", self.name);
    }

    fn on_join(&mut self, event: JoinEvent) {
        let JoinEvent { member, done } = event;
        let notice = ChatMessage::system(format!("{} joined {}", member.nickname, self.name));

        self.members.insert(member.username.clone(), member);
        self.broadcast(&notice);
        debug!("Room {} has {} members", self.name, self.members.len());

        let _ = done.send(());
    }

    fn on_leave(&mut self, event: LeaveEvent) {
        let LeaveEvent {
            username,
            connection,
            done,
        } = event;

        // A leave from an older connection must not evict the current one
        let joined_by = self.members.get(&username).map(|m| m.connection);
        if joined_by != Some(connection) {
            if joined_by.is_some() {
                debug!("Stale leave for {} in {} ignored", username, self.name);
            }
            let _ = done.send(());
            return;
        }

        if let Some(member) = self.members.remove(&username) {
            let notice = ChatMessage::system(format!("{} left {}", member.nickname, self.name));
            self.broadcast(&notice);
            debug!("Room {} has {} members", self.name, self.members.len());
        }

        let _ = done.send(());
    }

    fn on_message(&mut self, msg: ChatMessage) {
        self.broadcast(&msg);
    }

    fn on_query(&mut self, query: RoomQuery) {
        match query {
            RoomQuery::Roster { respond_to } => {
                let mut roster: Vec<MemberView> =
                    self.members.values().map(Member::view).collect();
                roster.sort();
                let _ = respond_to.send(roster);
            }
            RoomQuery::Rename { username, nickname } => {
                if let Some(member) = self.members.get_mut(&username) {
                    member.nickname = nickname;
                }
            }
        }
    }

    /// Deliver to every member except the sender, dropping on full mailboxes
    fn broadcast(&self, msg: &ChatMessage) {
        for member in self.members.values() {
            if msg.is_from(&member.username) {
                continue;
            }
            match member.deliver(msg.clone()) {
                Ok(()) => {}
                Err(DeliveryError::MailboxFull) => {
                    debug!(
                        "Mailbox of {} full, dropping message in {}",
                        member.username, self.name
                    );
                }
                Err(DeliveryError::MailboxClosed) => {
                    debug!(
                        "Mailbox of {} closed, dropping message in {}",
                        member.username, self.name
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::types::SYSTEM_SENDER;

    const WAIT: Duration = Duration::from_secs(2);

    fn member(username: &str, capacity: usize) -> (Member, mpsc::Receiver<ChatMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let member = Member::new(
            username,
            format!("{}-nick", username),
            ConnectionId::new(),
            tx,
        );
        (member, rx)
    }

    async fn join(room: &RoomHandle, member: Member) {
        let done = room.join(member).await.unwrap();
        timeout(WAIT, done).await.unwrap().unwrap();
    }

    async fn leave(room: &RoomHandle, member: &Member) {
        let done = room
            .leave(member.username.clone(), member.connection)
            .await
            .unwrap();
        timeout(WAIT, done).await.unwrap().unwrap();
    }

    async fn usernames(room: &RoomHandle) -> Vec<String> {
        room.roster()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.username)
            .collect()
    }

    async fn next(rx: &mut mpsc::Receiver<ChatMessage>) -> ChatMessage {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_join_announced_to_all_members() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bob, mut bob_rx) = member("bob", 8);

        join(&room, alice).await;
        assert_eq!(next(&mut alice_rx).await.text, "alice-nick joined general");

        join(&room, bob).await;
        assert_eq!(next(&mut alice_rx).await.text, "bob-nick joined general");
        let notice = next(&mut bob_rx).await;
        assert_eq!(notice.sender, SYSTEM_SENDER);
        assert_eq!(notice.text, "bob-nick joined general");

        assert_eq!(usernames(&room).await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_leave_announced_to_remaining_members() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bob, mut bob_rx) = member("bob", 8);

        join(&room, alice).await;
        join(&room, bob.clone()).await;
        leave(&room, &bob).await;

        assert_eq!(next(&mut alice_rx).await.text, "alice-nick joined general");
        assert_eq!(next(&mut alice_rx).await.text, "bob-nick joined general");
        assert_eq!(next(&mut alice_rx).await.text, "bob-nick left general");

        assert_eq!(next(&mut bob_rx).await.text, "bob-nick joined general");
        assert!(bob_rx.try_recv().is_err());

        assert_eq!(usernames(&room).await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_leave_non_member_is_silent() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);

        let (mallory, _mallory_rx) = member("mallory", 8);

        join(&room, alice).await;
        let _ = next(&mut alice_rx).await;

        leave(&room, &mallory).await;
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(usernames(&room).await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_membership_follows_join_leave_sequence() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (a, _a_rx) = member("a", 64);
        let (b, _b_rx) = member("b", 64);
        let (c, _c_rx) = member("c", 64);

        join(&room, a.clone()).await;
        join(&room, b.clone()).await;
        join(&room, a.clone()).await;
        leave(&room, &a).await;
        join(&room, c.clone()).await;
        leave(&room, &b).await;
        leave(&room, &b).await;
        join(&room, a.clone()).await;
        join(&room, b.clone()).await;
        leave(&room, &c).await;

        assert_eq!(usernames(&room).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_leave_from_previous_connection_ignored() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);
        let (old_bob, _old_rx) = member("bob", 8);
        let (new_bob, _new_rx) = member("bob", 8);

        join(&room, alice).await;
        join(&room, old_bob.clone()).await;
        join(&room, new_bob.clone()).await;
        leave(&room, &old_bob).await;

        assert_eq!(usernames(&room).await, vec!["alice", "bob"]);
        assert_eq!(next(&mut alice_rx).await.text, "alice-nick joined general");
        assert_eq!(next(&mut alice_rx).await.text, "bob-nick joined general");
        assert_eq!(next(&mut alice_rx).await.text, "bob-nick joined general");
        assert!(alice_rx.try_recv().is_err());

        leave(&room, &new_bob).await;
        assert_eq!(usernames(&room).await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_message_not_sent_back_to_sender() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bob, mut bob_rx) = member("bob", 8);

        join(&room, alice).await;
        join(&room, bob).await;
        let _ = next(&mut alice_rx).await;
        let _ = next(&mut alice_rx).await;
        let _ = next(&mut bob_rx).await;

        room.send(ChatMessage::new("alice", "hello")).await.unwrap();

        let received = next(&mut bob_rx).await;
        assert_eq!(received.render(), "alice: hello");

        // A roster round-trip guarantees the message was already fanned out
        let _ = room.roster().await.unwrap();
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_mailbox_does_not_block_others() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (stalled, mut stalled_rx) = member("stalled", 1);
        let (alice, mut alice_rx) = member("alice", 16);

        join(&room, stalled).await;
        join(&room, alice).await;
        // stalled's single slot now holds its own join notice

        room.send(ChatMessage::new("carol", "first")).await.unwrap();
        room.send(ChatMessage::new("carol", "second")).await.unwrap();

        assert_eq!(next(&mut alice_rx).await.text, "alice-nick joined general");
        assert_eq!(next(&mut alice_rx).await.text, "first");
        assert_eq!(next(&mut alice_rx).await.text, "second");

        // The room keeps processing events
        assert_eq!(usernames(&room).await, vec!["alice", "stalled"]);

        assert_eq!(next(&mut stalled_rx).await.text, "stalled-nick joined general");
        assert!(stalled_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rename_updates_roster_and_announcements() {
        let room = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bob, _bob_rx) = member("bob", 8);

        join(&room, bob.clone()).await;
        join(&room, alice).await;
        let _ = next(&mut alice_rx).await;

        room.rename("bob".to_string(), "robert".to_string())
            .await
            .unwrap();
        let roster = room.roster().await.unwrap();
        assert_eq!(roster[1].nickname, "robert");

        leave(&room, &bob).await;
        assert_eq!(next(&mut alice_rx).await.text, "robert left general");
    }

    #[tokio::test]
    async fn test_same_room() {
        let general = Room::spawn(RoomName::parse("general").unwrap(), 8);
        let other = Room::spawn(RoomName::parse("general").unwrap(), 8);

        assert!(general.same_room(&general.clone()));
        assert!(!general.same_room(&other));
        assert_eq!(general.name().as_str(), "general");
    }
}
