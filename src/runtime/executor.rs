//! Conversation engine: runs one user event through the state machine and
//! carries out the effects it asks for

use super::traits::{Notifier, Repository, SessionStore};
use crate::config::FlowLimits;
use crate::db::UserId;
use crate::market::{ledger, proposals, selector, FavoriteOutcome, MarketError};
use crate::state_machine::{transition, Effect, Event, FlowState, Outbound, SessionContext, UserInput};
use serde::Serialize;
use std::collections::VecDeque;

/// Everything one step produced for the calling user
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub replies: Vec<Outbound>,
    pub state: FlowState,
}

/// Generic engine that can work with any repository, session store and notifier
pub struct ConversationEngine<R, S, N> {
    repo: R,
    sessions: S,
    notifier: N,
    limits: FlowLimits,
}

impl<R, S, N> ConversationEngine<R, S, N>
where
    R: Repository,
    S: SessionStore,
    N: Notifier,
{
    pub fn new(repo: R, sessions: S, notifier: N, limits: FlowLimits) -> Self {
        Self {
            repo,
            sessions,
            notifier,
            limits,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Process one input from `user_id` to completion.
    ///
    /// Effect outcomes are fed back into the state machine until it stops
    /// asking for work. The final state is saved, or the session dropped
    /// once the flow is back at idle.
    pub async fn handle(&self, user_id: UserId, display_name: &str, input: UserInput) -> StepOutcome {
        let context = match self.context_for(user_id, display_name).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load user");
                self.sessions.clear(user_id).await;
                return StepOutcome {
                    replies: vec![Outbound::Failure {
                        message: e.to_string(),
                    }],
                    state: FlowState::Idle,
                };
            }
        };

        let mut state = self.sessions.load(user_id).await.unwrap_or_default();
        let mut replies = Vec::new();
        let mut pending = VecDeque::from([Event::Input(input)]);

        while let Some(event) = pending.pop_front() {
            let result = match transition(&state, &context, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Dropping event");
                    continue;
                }
            };
            state = result.new_state;

            for effect in result.effects {
                let Some(next) = self.execute_effect(&context, effect, &mut replies).await else {
                    continue;
                };
                let failed = next.is_failure();
                pending.push_back(next);
                // The failure resets the flow; later effects of this batch are moot
                if failed {
                    break;
                }
            }
        }

        if state.is_idle() {
            self.sessions.clear(user_id).await;
        } else {
            self.sessions.save(user_id, state.clone()).await;
        }
        StepOutcome { replies, state }
    }

    async fn context_for(&self, user_id: UserId, display_name: &str) -> Result<SessionContext, MarketError> {
        let user = self.repo.get_or_create_user(user_id, display_name).await?;
        let context = SessionContext::new(user_id, self.limits);
        Ok(match user.location {
            Some(point) => context.with_location(point, user.location_label),
            None => context,
        })
    }

    /// Run one effect; returns the outcome event if the state machine is
    /// waiting for one
    async fn execute_effect(
        &self,
        context: &SessionContext,
        effect: Effect,
        replies: &mut Vec<Outbound>,
    ) -> Option<Event> {
        let user_id = context.user_id;
        match effect {
            Effect::Reply(message) => {
                replies.push(message);
                None
            }

            Effect::Notify { user_id: target, message } => {
                if let Err(e) = self.notifier.deliver(target, &message).await {
                    tracing::warn!(user_id = target, error = %e, "Notification not delivered");
                }
                None
            }

            Effect::FetchCandidate(query) => {
                tracing::debug!(user_id, category = %query.category, cursor = query.cursor, "Fetching candidate");
                match selector::next_candidate(&self.repo, &query).await {
                    Ok(item) => Some(Event::CandidateFetched { item }),
                    Err(e) => Some(failed(user_id, &e)),
                }
            }

            Effect::RecordView { item_id } => {
                match ledger::record_view(&self.repo, item_id, user_id).await {
                    Ok(_) => None,
                    Err(e) => Some(failed(user_id, &e)),
                }
            }

            Effect::LoadOwnItems { category } => {
                match self.repo.get_user_items(user_id, true).await {
                    Ok(items) => Some(Event::OwnItemsLoaded {
                        items: items.into_iter().filter(|i| i.category == category).collect(),
                    }),
                    Err(e) => Some(failed(user_id, &MarketError::from(e))),
                }
            }

            Effect::CreateItem(item) => match self.repo.create_item(&item).await {
                Ok(item_id) => {
                    tracing::info!(user_id, item_id, category = %item.category, "Item created");
                    Some(Event::ItemCreated { item_id })
                }
                Err(e) => Some(failed(user_id, &MarketError::from(e))),
            },

            Effect::SubmitProposal(request) => match proposals::propose(&self.repo, &request).await {
                Ok(outcome) => Some(Event::ProposalSubmitted { outcome }),
                Err(e) => Some(failed(user_id, &e)),
            },

            Effect::AddFavorite { item_id } => match ledger::add_favorite(&self.repo, user_id, item_id).await {
                Ok(outcome) => Some(Event::FavoriteAdded {
                    newly: outcome == FavoriteOutcome::Added,
                }),
                Err(e) => Some(failed(user_id, &e)),
            },
        }
    }
}

fn failed(user_id: UserId, err: &MarketError) -> Event {
    match err {
        MarketError::Repository(_) => tracing::error!(user_id, error = %err, "Repository call failed"),
        _ => tracing::info!(user_id, error = %err, "Operation rejected"),
    }
    Event::OperationFailed {
        kind: err.kind(),
        message: err.to_string(),
    }
}
