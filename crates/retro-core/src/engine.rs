//! Card aggregation engine.
//!
//! Owns the parent/child and link-set fields of cards and keeps
//! `aggregated_reaction_count` equal to the sum of the children's direct
//! counts. Reactions adjust counters by one; structural changes (link,
//! unlink, delete) recompute the affected aggregate from the current child
//! set. Every operation is a single storage transaction that re-checks the
//! board's lifecycle state before writing.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::card::{public, Card, CardCounts, LinkType};
use crate::error::CoreError;
use crate::event::BoardEvent;
use crate::gate::LifecycleGate;
use crate::ids::{BoardId, CardId, UserHash};
use crate::notify::NotificationSink;
use crate::reaction::Reaction;
use crate::relationship::{LinkEndpoint, RelationshipValidator};
use crate::storage::{CountUpdate, Storage, StorageTxn};

/// Result of a link or unlink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkOutcome {
    pub link_type: LinkType,
    #[serde(serialize_with = "public::card")]
    pub source: Card,
    #[serde(serialize_with = "public::card")]
    pub target: Card,
    /// For a `ParentOf` link that moved the target away from another parent,
    /// that parent after its aggregate was recomputed.
    #[serde(serialize_with = "public::option")]
    pub previous_parent: Option<Card>,
    /// False when the call was an idempotent no-op.
    pub changed: bool,
}

impl LinkOutcome {
    fn counts(&self) -> Vec<CardCounts> {
        let mut counts = vec![self.source.counts(), self.target.counts()];
        counts.extend(self.previous_parent.as_ref().map(Card::counts));
        counts
    }
}

/// Result of adding or removing a reaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionOutcome {
    #[serde(serialize_with = "public::card")]
    pub card: Card,
    #[serde(serialize_with = "public::option")]
    pub parent: Option<Card>,
    pub changed: bool,
}

impl ReactionOutcome {
    fn counts(&self) -> Vec<CardCounts> {
        let mut counts = vec![self.card.counts()];
        counts.extend(self.parent.as_ref().map(Card::counts));
        counts
    }
}

/// Result of deleting a card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardDeletion {
    pub card_id: CardId,
    pub board_id: BoardId,
    /// Cards whose parent or link set changed, including the former parent.
    pub affected: Vec<CardId>,
    /// The former parent after its aggregate was recomputed.
    #[serde(serialize_with = "public::option")]
    pub parent: Option<Card>,
    pub reactions_removed: u64,
}

pub struct CardEngine<S, N> {
    storage: Arc<S>,
    sink: Arc<N>,
}

impl<S: Storage, N: NotificationSink> CardEngine<S, N> {
    pub fn new(storage: Arc<S>, sink: Arc<N>) -> Self {
        Self { storage, sink }
    }

    /// Link `source_id` to `target_id`.
    ///
    /// For `ParentOf`, `source_id` becomes the parent of `target_id`. A target
    /// that already has another parent is moved. For `LinkedTo` the pair is
    /// unordered and the feedback id is stored on the action card.
    pub fn link(
        &self,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CoreError> {
        let mut txn = self.storage.begin()?;
        let source = LifecycleGate::load_card(&*txn, source_id)?;
        let target = LifecycleGate::load_card(&*txn, target_id)?;
        LifecycleGate::load_active_board(&*txn, source.board_id)?;

        let outcome = match link_type {
            LinkType::ParentOf => {
                let source_children = txn.children_of(source.id)?.len();
                let target_children = txn.children_of(target.id)?.len();
                RelationshipValidator::validate_link(
                    LinkEndpoint::new(&source, source_children),
                    LinkEndpoint::new(&target, target_children),
                    link_type,
                )?;

                if target.parent_card_id == Some(source.id) {
                    return Ok(LinkOutcome {
                        link_type,
                        source,
                        target,
                        previous_parent: None,
                        changed: false,
                    });
                }

                let previous = target.parent_card_id;
                let child = txn.set_parent(target.id, Some(source.id))?;
                let parent = txn.recompute_aggregate(source.id)?;
                let previous_parent = previous
                    .map(|old| recompute_if_present(&mut *txn, old))
                    .transpose()?
                    .flatten();

                LinkOutcome {
                    link_type,
                    source: parent,
                    target: child,
                    previous_parent,
                    changed: true,
                }
            }
            LinkType::LinkedTo => {
                RelationshipValidator::validate_link(
                    LinkEndpoint::new(&source, 0),
                    LinkEndpoint::new(&target, 0),
                    link_type,
                )?;
                let (action, feedback) =
                    RelationshipValidator::action_and_feedback(&source, &target)?;
                let (action_id, feedback_id) = (action.id, feedback.id);

                let (updated, changed) = txn.insert_linked_feedback(action_id, feedback_id)?;
                let (source, target) = if updated.id == source.id {
                    (updated, target)
                } else {
                    (source, updated)
                };
                LinkOutcome {
                    link_type,
                    source,
                    target,
                    previous_parent: None,
                    changed,
                }
            }
        };

        if !outcome.changed {
            return Ok(outcome);
        }
        txn.commit()?;

        debug!(
            source = %source_id,
            target = %target_id,
            link_type = ?link_type,
            "Linked cards"
        );
        self.sink.notify(BoardEvent::CardLinked {
            board_id: outcome.source.board_id,
            source_id,
            target_id,
            link_type,
            counts: outcome.counts(),
        });
        Ok(outcome)
    }

    /// Remove a link between `source_id` and `target_id`.
    ///
    /// A `ParentOf` unlink requires `source_id` to be the current parent of
    /// `target_id`. A `LinkedTo` unlink removes each id from the other's link
    /// set and succeeds even if no link existed.
    pub fn unlink(
        &self,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CoreError> {
        let mut txn = self.storage.begin()?;
        let source = LifecycleGate::load_card(&*txn, source_id)?;
        let target = LifecycleGate::load_card(&*txn, target_id)?;
        LifecycleGate::load_active_board(&*txn, source.board_id)?;
        RelationshipValidator::validate_unlink(&source, &target, link_type)?;

        let outcome = match link_type {
            LinkType::ParentOf => {
                let child = txn.set_parent(target.id, None)?;
                let parent = txn.recompute_aggregate(source.id)?;
                LinkOutcome {
                    link_type,
                    source: parent,
                    target: child,
                    previous_parent: None,
                    changed: true,
                }
            }
            LinkType::LinkedTo => {
                let (source, from_source) = txn.remove_linked_feedback(source.id, target.id)?;
                let (target, from_target) = txn.remove_linked_feedback(target.id, source.id)?;
                LinkOutcome {
                    link_type,
                    source,
                    target,
                    previous_parent: None,
                    changed: from_source || from_target,
                }
            }
        };

        if !outcome.changed {
            return Ok(outcome);
        }
        txn.commit()?;

        debug!(
            source = %source_id,
            target = %target_id,
            link_type = ?link_type,
            "Unlinked cards"
        );
        self.sink.notify(BoardEvent::CardUnlinked {
            board_id: outcome.source.board_id,
            source_id,
            target_id,
            link_type,
            counts: outcome.counts(),
        });
        Ok(outcome)
    }

    /// Record `user`'s reaction to a card. Reacting again is a no-op.
    pub fn add_reaction(
        &self,
        card_id: CardId,
        user: &UserHash,
        alias: Option<String>,
        reaction_type: Option<String>,
    ) -> Result<ReactionOutcome, CoreError> {
        let mut txn = self.storage.begin()?;
        let card = LifecycleGate::load_card(&*txn, card_id)?;
        LifecycleGate::load_active_board(&*txn, card.board_id)?;

        let reaction = Reaction::new(card.id, card.board_id, user.clone(), alias, reaction_type);
        if !txn.insert_reaction(&reaction)? {
            let parent = match card.parent_card_id {
                Some(parent_id) => txn.get_card(parent_id)?,
                None => None,
            };
            return Ok(ReactionOutcome {
                card,
                parent,
                changed: false,
            });
        }

        let outcome = adjust_counts(&mut *txn, card.id, 1)?;
        txn.commit()?;

        debug!(card = %card_id, user = %user, "Reaction added");
        self.sink.notify(BoardEvent::ReactionAdded {
            board_id: outcome.card.board_id,
            card_id,
            counts: outcome.counts(),
        });
        Ok(outcome)
    }

    /// Remove `user`'s reaction from a card, if there is one.
    pub fn remove_reaction(
        &self,
        card_id: CardId,
        user: &UserHash,
    ) -> Result<ReactionOutcome, CoreError> {
        let mut txn = self.storage.begin()?;
        let card = LifecycleGate::load_card(&*txn, card_id)?;
        LifecycleGate::load_active_board(&*txn, card.board_id)?;

        if !txn.delete_reaction(card.id, user)? {
            let parent = match card.parent_card_id {
                Some(parent_id) => txn.get_card(parent_id)?,
                None => None,
            };
            return Ok(ReactionOutcome {
                card,
                parent,
                changed: false,
            });
        }

        let outcome = adjust_counts(&mut *txn, card.id, -1)?;
        txn.commit()?;

        debug!(card = %card_id, user = %user, "Reaction removed");
        self.sink.notify(BoardEvent::ReactionRemoved {
            board_id: outcome.card.board_id,
            card_id,
            counts: outcome.counts(),
        });
        Ok(outcome)
    }

    /// Delete a card and repair everything that referenced it.
    ///
    /// The card's reactions are removed, its id is purged from every link
    /// set, its children become top-level and its former parent's aggregate
    /// is recomputed.
    pub fn delete_card(&self, card_id: CardId) -> Result<CardDeletion, CoreError> {
        let mut txn = self.storage.begin()?;
        let card = LifecycleGate::load_card(&*txn, card_id)?;
        LifecycleGate::load_active_board(&*txn, card.board_id)?;

        let reactions_removed = txn.delete_reactions_by_cards(&[card.id])?;
        let mut affected = txn.purge_links_to(card.board_id, card.id)?;
        affected.extend(txn.orphan_children(card.id)?);
        txn.delete_card(card.id)?;

        let parent = match card.parent_card_id {
            Some(parent_id) => recompute_if_present(&mut *txn, parent_id)?,
            None => None,
        };
        affected.extend(parent.as_ref().map(|p| p.id));
        affected.sort();
        affected.dedup();

        txn.commit()?;

        debug!(
            card = %card_id,
            affected = affected.len(),
            reactions_removed,
            "Card deleted"
        );
        let deletion = CardDeletion {
            card_id,
            board_id: card.board_id,
            affected,
            parent,
            reactions_removed,
        };
        self.sink.notify(BoardEvent::CardDeleted {
            board_id: deletion.board_id,
            card_id,
            affected: deletion.affected.clone(),
            parent: deletion.parent.as_ref().map(Card::counts),
        });
        Ok(deletion)
    }
}

/// Apply a reaction delta to a card and, if it has a parent, to the parent's
/// aggregate.
fn adjust_counts<T: StorageTxn + ?Sized>(
    txn: &mut T,
    card_id: CardId,
    delta: i32,
) -> Result<ReactionOutcome, CoreError> {
    let CountUpdate { card, clamped } = txn.increment_direct_count(card_id, delta)?;
    if clamped {
        warn!(card = %card_id, delta, "Direct reaction count would go negative, clamped at zero");
    }

    let parent = match card.parent_card_id {
        Some(parent_id) => {
            let update = txn.increment_aggregated_count(parent_id, delta)?;
            if update.clamped {
                warn!(
                    card = %parent_id,
                    child = %card_id,
                    delta,
                    "Aggregated reaction count would go negative, clamped at zero"
                );
            }
            Some(update.card)
        }
        None => None,
    };

    Ok(ReactionOutcome {
        card,
        parent,
        changed: true,
    })
}

fn recompute_if_present<T: StorageTxn + ?Sized>(
    txn: &mut T,
    parent_id: CardId,
) -> Result<Option<Card>, CoreError> {
    if txn.get_card(parent_id)?.is_none() {
        warn!(card = %parent_id, "Parent card missing during recompute");
        return Ok(None);
    }
    Ok(Some(txn.recompute_aggregate(parent_id)?))
}
