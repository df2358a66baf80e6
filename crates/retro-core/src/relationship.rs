//! Legality of links between cards.
//!
//! Pure decisions over card snapshots; nothing here touches storage.

use crate::card::{Card, CardType, LinkType};
use crate::error::LinkRejection;

/// A card snapshot plus the number of children it has.
#[derive(Debug, Clone, Copy)]
pub struct LinkEndpoint<'a> {
    pub card: &'a Card,
    pub child_count: usize,
}

impl<'a> LinkEndpoint<'a> {
    pub fn new(card: &'a Card, child_count: usize) -> Self {
        Self { card, child_count }
    }

    fn has_parent(&self) -> bool {
        self.card.parent_card_id.is_some()
    }

    fn has_children(&self) -> bool {
        self.child_count > 0
    }
}

pub struct RelationshipValidator;

impl RelationshipValidator {
    /// Decide whether `source` may be linked to `target`.
    ///
    /// For `ParentOf` the source is the proposed parent and the target the
    /// proposed child. For `LinkedTo` the direction does not matter.
    pub fn validate_link(
        source: LinkEndpoint<'_>,
        target: LinkEndpoint<'_>,
        link_type: LinkType,
    ) -> Result<(), LinkRejection> {
        Self::check_pair(source.card, target.card)?;

        match link_type {
            LinkType::ParentOf => {
                if source.card.card_type != CardType::Feedback
                    || target.card.card_type != CardType::Feedback
                {
                    return Err(LinkRejection::NotFeedback);
                }
                if target.has_children() {
                    return Err(LinkRejection::ChildCannotBeParent);
                }
                if source.has_parent() {
                    return Err(LinkRejection::ParentCannotBeChild);
                }
                Ok(())
            }
            LinkType::LinkedTo => Self::action_and_feedback(source.card, target.card).map(|_| ()),
        }
    }

    /// Decide whether an existing link may be removed.
    ///
    /// Removing a `LinkedTo` association that does not exist is accepted.
    pub fn validate_unlink(
        source: &Card,
        target: &Card,
        link_type: LinkType,
    ) -> Result<(), LinkRejection> {
        Self::check_pair(source, target)?;

        match link_type {
            LinkType::ParentOf if target.parent_card_id != Some(source.id) => {
                Err(LinkRejection::NotLinked)
            }
            _ => Ok(()),
        }
    }

    /// Order an action/feedback pair as `(action, feedback)`.
    pub fn action_and_feedback<'a>(
        a: &'a Card,
        b: &'a Card,
    ) -> Result<(&'a Card, &'a Card), LinkRejection> {
        match (a.card_type, b.card_type) {
            (CardType::Action, CardType::Feedback) => Ok((a, b)),
            (CardType::Feedback, CardType::Action) => Ok((b, a)),
            _ => Err(LinkRejection::WrongCardTypes),
        }
    }

    fn check_pair(source: &Card, target: &Card) -> Result<(), LinkRejection> {
        if source.id == target.id {
            return Err(LinkRejection::SelfLink);
        }
        if source.board_id != target.board_id {
            return Err(LinkRejection::CrossBoard);
        }
        Ok(())
    }
}
