use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{GroupId, MessageId, SourceMessage};

/// A complete album, members ordered by source identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaGroup {
    pub group_id: GroupId,
    pub members: Vec<SourceMessage>,
}

impl MediaGroup {
    fn from_members(group_id: GroupId, mut members: Vec<SourceMessage>) -> Self {
        // Arrival order from the transport is not identifier order.
        members.sort_by_key(|m| m.id);
        Self { group_id, members }
    }
}

/// One atomic outbound operation: a single message or a whole album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendableUnit {
    Single(SourceMessage),
    Group(MediaGroup),
}

impl SendableUnit {
    /// Messages in this unit, in send order.
    pub fn members(&self) -> &[SourceMessage] {
        match self {
            SendableUnit::Single(msg) => std::slice::from_ref(msg),
            SendableUnit::Group(group) => &group.members,
        }
    }

    /// Source identifiers of all members, in send order.
    pub fn source_ids(&self) -> Vec<MessageId> {
        self.members().iter().map(|m| m.id).collect()
    }

    /// Reply target of the unit, taken from its first member.
    pub fn reply_to(&self) -> Option<MessageId> {
        self.members().first().and_then(|m| m.reply_to)
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            SendableUnit::Single(_) => None,
            SendableUnit::Group(group) => Some(&group.group_id),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, SendableUnit::Group(_))
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Check that the unit can be handed to the transport at all.
    pub fn validate(&self) -> Result<()> {
        match self {
            SendableUnit::Single(msg) => {
                if msg.payload.is_empty() {
                    return Err(Error::EmptyPayload(msg.id));
                }
            }
            SendableUnit::Group(group) => {
                if group.members.is_empty() {
                    return Err(Error::EmptyGroup(group.group_id.clone()));
                }
                if let Some(bare) = group.members.iter().find(|m| m.payload.media.is_none()) {
                    return Err(Error::GroupMemberWithoutMedia {
                        group: group.group_id.clone(),
                        id: bare.id,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Buffers album members by group identifier until the album is closed.
///
/// An ungrouped message closes every open album; members of different albums
/// may interleave without splitting either one. Closed albums are emitted
/// ahead of the message that closed them, ordered by their lowest member id.
#[derive(Debug, Default)]
pub struct Aggregator {
    open: BTreeMap<GroupId, Vec<SourceMessage>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next message. Returns the units that became ready.
    pub fn push(&mut self, message: SourceMessage) -> Vec<SendableUnit> {
        match message.group_id.clone() {
            Some(group_id) => {
                self.open.entry(group_id).or_default().push(message);
                Vec::new()
            }
            None => {
                let mut ready = self.flush_all();
                ready.push(SendableUnit::Single(message));
                ready
            }
        }
    }

    /// Close every open album, oldest first. Called when the backlog is exhausted.
    pub fn flush_all(&mut self) -> Vec<SendableUnit> {
        let mut groups: Vec<MediaGroup> = std::mem::take(&mut self.open)
            .into_iter()
            .map(|(group_id, members)| MediaGroup::from_members(group_id, members))
            .collect();

        // Group ids are opaque ("9" sorts after "10"); source order decides.
        groups.sort_by_key(|group| group.members.first().map(|m| m.id));
        groups.into_iter().map(SendableUnit::Group).collect()
    }

    /// Number of messages waiting in open albums.
    pub fn pending_count(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }

    /// Number of albums currently open.
    pub fn open_groups(&self) -> usize {
        self.open.len()
    }
}

/// Turn an ordered backlog into sendable units.
pub fn aggregate(messages: impl IntoIterator<Item = SourceMessage>) -> Vec<SendableUnit> {
    let mut aggregator = Aggregator::new();
    let mut units = Vec::new();
    for message in messages {
        units.extend(aggregator.push(message));
    }
    units.extend(aggregator.flush_all());
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaKind, MediaRef};

    fn photo(id: MessageId, group: &str) -> SourceMessage {
        SourceMessage::media(id, MediaRef::new(MediaKind::Photo, format!("file_{}", id)))
            .in_group(group)
    }

    #[test]
    fn test_singles_pass_through() {
        let units = aggregate(vec![SourceMessage::text(1, "a"), SourceMessage::text(2, "b")]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].source_ids(), vec![1]);
        assert_eq!(units[1].source_ids(), vec![2]);
        assert!(!units[0].is_group());
    }

    #[test]
    fn test_group_sorted_by_id() {
        let units = aggregate(vec![photo(5, "G"), photo(7, "G"), photo(6, "G")]);
        assert_eq!(units.len(), 1);
        assert!(units[0].is_group());
        assert_eq!(units[0].source_ids(), vec![5, 6, 7]);
    }

    #[test]
    fn test_ungrouped_message_closes_group() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.push(photo(2, "G1")).is_empty());
        assert!(aggregator.push(photo(3, "G1")).is_empty());
        assert_eq!(aggregator.pending_count(), 2);

        let ready = aggregator.push(SourceMessage::text(4, "after"));
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].group_id(), Some("G1"));
        assert_eq!(ready[0].source_ids(), vec![2, 3]);
        assert_eq!(ready[1].source_ids(), vec![4]);
        assert_eq!(aggregator.pending_count(), 0);
    }

    #[test]
    fn test_singleton_group_is_still_a_group() {
        let units = aggregate(vec![photo(9, "solo")]);
        assert_eq!(units.len(), 1);
        assert!(units[0].is_group());
        assert_eq!(units[0].len(), 1);
    }

    #[test]
    fn test_interleaved_groups_stay_whole() {
        let units = aggregate(vec![photo(2, "A"), photo(3, "B"), photo(4, "A"), photo(5, "B")]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].group_id(), Some("A"));
        assert_eq!(units[0].source_ids(), vec![2, 4]);
        assert_eq!(units[1].group_id(), Some("B"));
        assert_eq!(units[1].source_ids(), vec![3, 5]);
    }

    #[test]
    fn test_end_of_stream_flushes_oldest_first() {
        let mut aggregator = Aggregator::new();
        aggregator.push(photo(1, "zeta"));
        aggregator.push(photo(2, "alpha"));
        assert_eq!(aggregator.open_groups(), 2);

        let units = aggregator.flush_all();
        assert_eq!(units[0].group_id(), Some("zeta"));
        assert_eq!(units[1].group_id(), Some("alpha"));
        assert_eq!(aggregator.open_groups(), 0);
    }

    #[test]
    fn test_closed_groups_follow_source_order() {
        // Telegram album ids are numeric strings; "10" sorts before "9".
        let units = aggregate(vec![
            photo(2, "9"),
            photo(3, "10").replying_to(2),
            SourceMessage::text(4, "after"),
        ]);

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].group_id(), Some("9"));
        assert_eq!(units[0].source_ids(), vec![2]);
        assert_eq!(units[1].group_id(), Some("10"));
        assert_eq!(units[1].source_ids(), vec![3]);
        assert_eq!(units[2].source_ids(), vec![4]);

        let units = aggregate(vec![photo(2, "9"), photo(3, "10")]);
        assert_eq!(units[0].source_ids(), vec![2]);
        assert_eq!(units[1].source_ids(), vec![3]);
    }

    #[test]
    fn test_reply_target_from_first_member() {
        let units = aggregate(vec![photo(11, "G").replying_to(1), photo(10, "G")]);
        // Member 10 sorts first and carries no reply target.
        assert_eq!(units[0].reply_to(), None);

        let units = aggregate(vec![photo(10, "G").replying_to(1), photo(11, "G")]);
        assert_eq!(units[0].reply_to(), Some(1));
    }

    #[test]
    fn test_validate() {
        let empty = SendableUnit::Single(SourceMessage {
            id: 1,
            group_id: None,
            reply_to: None,
            payload: Default::default(),
        });
        assert!(matches!(empty.validate(), Err(Error::EmptyPayload(1))));

        let text_in_album = aggregate(vec![photo(1, "G"), SourceMessage::text(2, "x").in_group("G")]);
        assert!(matches!(
            text_in_album[0].validate(),
            Err(Error::GroupMemberWithoutMedia { id: 2, .. })
        ));

        assert!(aggregate(vec![photo(1, "G")])[0].validate().is_ok());
    }
}
