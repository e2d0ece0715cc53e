//! Pure state transition function
//!
//! Given the same state, context and event it always yields the same new
//! state and effects. All I/O is expressed as effects for the executor.

use super::state::{
    BrowseSession, BrowseStep, CreateStep, FlowState, ItemDraft, SessionContext,
};
use super::{Effect, Event, Outbound, UserInput};
use crate::catalog::{self, Category, ValidationError};
use crate::db::{Item, ItemId};
use crate::geo::GeoPoint;
use crate::market::{BrowseFilters, ErrorKind, ProposeOutcome, ProposeRequest};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: FlowState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: FlowState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    fn idle(reply: Outbound) -> Self {
        Self::new(FlowState::Idle).with_effect(Effect::reply(reply))
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    /// An effect outcome arrived in a state that never asked for it
    #[error("Unexpected {event} while {state}")]
    UnexpectedOutcome {
        state: &'static str,
        event: &'static str,
    },
}

/// Pure transition function
///
/// User input never fails: anything the current step cannot use re-issues
/// its prompt. Only stray effect outcomes are errors.
pub fn transition(
    state: &FlowState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Navigation available from anywhere
        // ============================================================
        (_, Event::Input(UserInput::MainMenu)) | (FlowState::Idle, Event::Input(UserInput::Cancel)) => {
            Ok(TransitionResult::idle(Outbound::MainMenu))
        }

        (_, Event::Input(UserInput::Cancel)) => Ok(TransitionResult::idle(Outbound::Cancelled)),

        // Starting a flow abandons whatever flow was active
        (_, Event::Input(UserInput::StartCreateItem)) => Ok(creating(
            CreateStep::ChoosingCategory,
            ItemDraft::default(),
            context,
        )),

        (_, Event::Input(UserInput::StartBrowse)) => {
            Ok(browsing(BrowseStep::ChoosingCategory, BrowseSession::default()))
        }

        (state, Event::Input(_)) if state.is_busy() => Ok(TransitionResult::new(state.clone())
            .with_effect(Effect::reply(Outbound::StillWorking))),

        (FlowState::Idle, Event::Input(_)) => Ok(TransitionResult::idle(Outbound::MainMenu)),

        // ============================================================
        // Create-Item flow
        // ============================================================
        (FlowState::CreatingItem { step, draft }, Event::Input(input)) => {
            Ok(create_input(*step, draft.clone(), context, input))
        }

        (
            FlowState::CreatingItem {
                step: CreateStep::Submitting,
                ..
            },
            Event::ItemCreated { item_id },
        ) => {
            Ok(TransitionResult::idle(Outbound::ItemCreated { item_id }))
        }

        // ============================================================
        // Browse flow
        // ============================================================
        (FlowState::Browsing { step, session }, Event::Input(input)) => {
            Ok(browse_input(step, session.clone(), context, input))
        }

        (
            FlowState::Browsing {
                step: BrowseStep::FetchingCandidate,
                session,
            },
            Event::CandidateFetched { item },
        ) => Ok(on_candidate(session.clone(), context, item)),

        (
            FlowState::Browsing {
                step: BrowseStep::LoadingOwnItems,
                session,
            },
            Event::OwnItemsLoaded { items },
        ) => Ok(on_own_items(session.clone(), context, items)),

        (
            FlowState::Browsing {
                step: BrowseStep::SubmittingProposal { offered },
                session,
            },
            Event::ProposalSubmitted { outcome },
        ) => Ok(on_proposal(session.clone(), context, *offered, outcome)),

        (
            FlowState::Browsing {
                step: BrowseStep::ShowingAds,
                ..
            },
            Event::FavoriteAdded { newly },
        ) => {
            let reply = if newly {
                Outbound::FavoriteAdded
            } else {
                Outbound::AlreadyFavorite
            };
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::reply(reply)))
        }

        // ============================================================
        // Failures clear the session
        // ============================================================
        (state, Event::OperationFailed { kind, message }) if !state.is_idle() => {
            let reply = match kind {
                ErrorKind::NotFound => Outbound::NotFound { message },
                _ => Outbound::Failure { message },
            };
            Ok(TransitionResult::idle(reply))
        }

        (state, event) => Err(TransitionError::UnexpectedOutcome {
            state: describe_state(state),
            event: describe_event(&event),
        }),
    }
}

// ============================================================
// Create-Item helpers
// ============================================================

fn create_input(
    step: CreateStep,
    mut draft: ItemDraft,
    context: &SessionContext,
    input: UserInput,
) -> TransitionResult {
    let limits = &context.limits;
    match (step, input) {
        (_, UserInput::Back) => create_back(step, draft, context),

        (CreateStep::ChoosingCategory, UserInput::Category { category }) => {
            choose_category(draft, category, context)
        }
        (CreateStep::ChoosingCategory, UserInput::Text { text }) => match text.parse::<Category>() {
            Ok(category) => choose_category(draft, category, context),
            Err(_) => reject_create(step, draft, context, ValidationError::UnknownCategory),
        },

        (CreateStep::EnteringTitle, UserInput::Text { text }) => {
            match catalog::validate_text(&text, limits.max_title_len) {
                Ok(title) => {
                    draft.title = Some(title);
                    creating(CreateStep::EnteringDescription, draft, context)
                }
                Err(e) => reject_create(step, draft, context, e),
            }
        }

        (CreateStep::EnteringDescription, UserInput::Text { text }) => {
            match catalog::validate_text(&text, limits.max_description_len) {
                Ok(description) => {
                    draft.description = Some(description);
                    let next = if draft.category.is_some_and(Category::requires_price) {
                        CreateStep::EnteringPrice
                    } else {
                        CreateStep::AwaitingPhoto
                    };
                    creating(next, draft, context)
                }
                Err(e) => reject_create(step, draft, context, e),
            }
        }

        (CreateStep::EnteringPrice, UserInput::Text { text }) => match catalog::parse_price(&text) {
            Ok(price) => {
                draft.price = price;
                creating(CreateStep::AwaitingPhoto, draft, context)
            }
            Err(e) => reject_create(step, draft, context, e),
        },
        (CreateStep::EnteringPrice, UserInput::Skip) => {
            draft.price = None;
            creating(CreateStep::AwaitingPhoto, draft, context)
        }

        (CreateStep::AwaitingPhoto, UserInput::Photo { reference }) => {
            let reference = reference.trim();
            if reference.is_empty() {
                return reject_create(step, draft, context, ValidationError::Empty);
            }
            draft.photo = Some(reference.to_string());
            after_photo(draft, context)
        }
        (CreateStep::AwaitingPhoto, UserInput::Skip) => {
            draft.photo = None;
            after_photo(draft, context)
        }

        (CreateStep::AwaitingLocation, UserInput::Location { lat, lon }) => {
            match GeoPoint::new(lat, lon) {
                Some(point) => {
                    draft.location = Some(point);
                    draft.location_label = Some(point.label());
                    creating(CreateStep::Confirming, draft, context)
                }
                None => reject_create(step, draft, context, ValidationError::InvalidCoordinates),
            }
        }
        // A typed place name is kept as a label without coordinates
        (CreateStep::AwaitingLocation, UserInput::Text { text }) => {
            match catalog::validate_text(&text, catalog::MAX_NAME_LEN) {
                Ok(label) => {
                    draft.location = None;
                    draft.location_label = Some(label);
                    creating(CreateStep::Confirming, draft, context)
                }
                Err(e) => reject_create(step, draft, context, e),
            }
        }
        (CreateStep::AwaitingLocation, UserInput::Skip) => {
            draft.location = None;
            draft.location_label = None;
            creating(CreateStep::Confirming, draft, context)
        }

        (CreateStep::Confirming, UserInput::Confirm { yes: true }) => {
            match draft.to_new_item(context.user_id) {
                Some(item) => TransitionResult::new(FlowState::CreatingItem {
                    step: CreateStep::Submitting,
                    draft,
                })
                .with_effect(Effect::CreateItem(item)),
                None => TransitionResult::idle(Outbound::Failure {
                    message: "Item details are incomplete".to_string(),
                }),
            }
        }
        (CreateStep::Confirming, UserInput::Confirm { yes: false }) => {
            TransitionResult::idle(Outbound::Cancelled)
        }

        (step, _) => reject_create(step, draft, context, ValidationError::UnexpectedInput),
    }
}

fn choose_category(mut draft: ItemDraft, category: Category, context: &SessionContext) -> TransitionResult {
    draft.category = Some(category);
    if !category.requires_price() {
        draft.price = None;
    }
    creating(CreateStep::EnteringTitle, draft, context)
}

/// Saved profile location skips the location step
fn after_photo(mut draft: ItemDraft, context: &SessionContext) -> TransitionResult {
    if let Some(point) = context.saved_location {
        draft.location = Some(point);
        draft.location_label = context.saved_location_label.clone();
        draft.asked_location = false;
        creating(CreateStep::Confirming, draft, context)
    } else {
        draft.asked_location = true;
        creating(CreateStep::AwaitingLocation, draft, context)
    }
}

fn create_back(step: CreateStep, draft: ItemDraft, context: &SessionContext) -> TransitionResult {
    let previous = match step {
        CreateStep::ChoosingCategory => return TransitionResult::idle(Outbound::MainMenu),
        CreateStep::EnteringTitle => CreateStep::ChoosingCategory,
        CreateStep::EnteringDescription => CreateStep::EnteringTitle,
        CreateStep::EnteringPrice => CreateStep::EnteringDescription,
        CreateStep::AwaitingPhoto => {
            if draft.category.is_some_and(Category::requires_price) {
                CreateStep::EnteringPrice
            } else {
                CreateStep::EnteringDescription
            }
        }
        CreateStep::AwaitingLocation => CreateStep::AwaitingPhoto,
        CreateStep::Confirming => {
            if draft.asked_location {
                CreateStep::AwaitingLocation
            } else {
                CreateStep::AwaitingPhoto
            }
        }
        CreateStep::Submitting => CreateStep::Submitting,
    };
    creating(previous, draft, context)
}

fn creating(step: CreateStep, draft: ItemDraft, context: &SessionContext) -> TransitionResult {
    let prompt = create_prompt(step, &draft, context);
    TransitionResult::new(FlowState::CreatingItem { step, draft }).with_effect(Effect::reply(prompt))
}

fn reject_create(
    step: CreateStep,
    draft: ItemDraft,
    context: &SessionContext,
    error: ValidationError,
) -> TransitionResult {
    let prompt = create_prompt(step, &draft, context);
    TransitionResult::new(FlowState::CreatingItem { step, draft })
        .with_effects([Effect::invalid(error), Effect::reply(prompt)])
}

fn create_prompt(step: CreateStep, draft: &ItemDraft, context: &SessionContext) -> Outbound {
    match step {
        CreateStep::ChoosingCategory => Outbound::ChooseCategory {
            categories: Category::ALL.to_vec(),
        },
        CreateStep::EnteringTitle => Outbound::EnterTitle {
            max_len: context.limits.max_title_len,
            current: draft.title.clone(),
        },
        CreateStep::EnteringDescription => Outbound::EnterDescription {
            max_len: context.limits.max_description_len,
            current: draft.description.clone(),
        },
        CreateStep::EnteringPrice => Outbound::EnterPrice {
            current: draft.price,
        },
        CreateStep::AwaitingPhoto => Outbound::SendPhoto,
        CreateStep::AwaitingLocation => Outbound::ShareLocation,
        CreateStep::Confirming => Outbound::ConfirmItem {
            draft: draft.clone(),
        },
        CreateStep::Submitting => Outbound::StillWorking,
    }
}

// ============================================================
// Browse helpers
// ============================================================

fn browse_input(
    step: &BrowseStep,
    mut session: BrowseSession,
    context: &SessionContext,
    input: UserInput,
) -> TransitionResult {
    match (step, input) {
        (BrowseStep::ChoosingCategory, UserInput::Back) => TransitionResult::idle(Outbound::MainMenu),

        (BrowseStep::ChoosingCategory, UserInput::SetFilters { filters }) => {
            if let Err(e) = validate_filters(&filters) {
                return reject_browse(step.clone(), session, e);
            }
            session.filters = filters;
            TransitionResult::new(FlowState::Browsing {
                step: BrowseStep::ChoosingCategory,
                session,
            })
            .with_effect(Effect::reply(Outbound::FiltersUpdated { filters }))
        }

        (BrowseStep::ChoosingCategory, UserInput::Category { category }) => {
            begin_pass(session, category, context)
        }
        (BrowseStep::ChoosingCategory, UserInput::Text { text }) => match text.parse::<Category>() {
            Ok(category) => begin_pass(session, category, context),
            Err(_) => reject_browse(step.clone(), session, ValidationError::UnknownCategory),
        },

        (BrowseStep::ShowingAds, UserInput::Skip) => fetch_next(session, context),

        (BrowseStep::ShowingAds, UserInput::Back) => {
            session.current = None;
            browsing(BrowseStep::ChoosingCategory, session)
        }

        (BrowseStep::ShowingAds, UserInput::ProposeSwap) => match session.current.as_ref() {
            Some(current) => {
                let category = current.category;
                TransitionResult::new(FlowState::Browsing {
                    step: BrowseStep::LoadingOwnItems,
                    session,
                })
                .with_effect(Effect::LoadOwnItems { category })
            }
            None => reject_browse(step.clone(), session, ValidationError::UnexpectedInput),
        },

        (BrowseStep::ShowingAds, UserInput::AddFavorite) => match session.current.as_ref() {
            Some(current) => {
                let item_id = current.id;
                TransitionResult::new(FlowState::Browsing {
                    step: BrowseStep::ShowingAds,
                    session,
                })
                .with_effect(Effect::AddFavorite { item_id })
            }
            None => reject_browse(step.clone(), session, ValidationError::UnexpectedInput),
        },

        (BrowseStep::SelectingOwnItemForSwap { options }, UserInput::SelectOwnItem { item_id }) => {
            choose_offer(options, item_id, session, context)
        }
        (BrowseStep::SelectingOwnItemForSwap { options }, UserInput::Text { text }) => {
            match text.trim().parse::<ItemId>() {
                Ok(item_id) => choose_offer(options, item_id, session, context),
                Err(_) => reject_browse(step.clone(), session, ValidationError::UnknownOption),
            }
        }
        (BrowseStep::SelectingOwnItemForSwap { .. }, UserInput::Back) => {
            browsing(BrowseStep::ShowingAds, session)
        }

        (step, _) => reject_browse(step.clone(), session, ValidationError::UnexpectedInput),
    }
}

fn validate_filters(filters: &BrowseFilters) -> Result<(), ValidationError> {
    match filters.radius_km {
        Some(r) if !(r.is_finite() && r > 0.0) => Err(ValidationError::InvalidRadius),
        _ => Ok(()),
    }
}

/// Start a pass over `category` from the beginning
fn begin_pass(mut session: BrowseSession, category: Category, context: &SessionContext) -> TransitionResult {
    session.category = Some(category);
    session.cursor = 0;
    session.current = None;
    session.visited.clear();
    session.origin = context.saved_location;
    fetch_next(session, context)
}

fn fetch_next(session: BrowseSession, context: &SessionContext) -> TransitionResult {
    match session.query(context) {
        Some(query) => TransitionResult::new(FlowState::Browsing {
            step: BrowseStep::FetchingCandidate,
            session,
        })
        .with_effect(Effect::FetchCandidate(query)),
        None => browsing(BrowseStep::ChoosingCategory, session),
    }
}

/// A pass ends on an empty result or on an item this pass already fetched
fn on_candidate(
    mut session: BrowseSession,
    context: &SessionContext,
    item: Option<Item>,
) -> TransitionResult {
    let Some(item) = item else {
        return TransitionResult::idle(Outbound::NoMoreItems);
    };
    if !session.visited.insert(item.id) {
        return TransitionResult::idle(Outbound::NoMoreItems);
    }
    session.cursor = item.id;

    if !session.filters.matches(&item) {
        return fetch_next(session, context);
    }

    let item_id = item.id;
    session.current = Some(item.clone());
    TransitionResult::new(FlowState::Browsing {
        step: BrowseStep::ShowingAds,
        session,
    })
    .with_effects([
        Effect::RecordView { item_id },
        Effect::reply(Outbound::ShowItem { item }),
    ])
}

fn on_own_items(session: BrowseSession, context: &SessionContext, items: Vec<Item>) -> TransitionResult {
    let Some(current) = session.current.as_ref() else {
        return TransitionResult::idle(Outbound::Failure {
            message: "No item is being shown".to_string(),
        });
    };
    let liked_item_id = current.id;
    let category = current.category;
    let options: Vec<Item> = items
        .into_iter()
        .filter(|i| i.is_active() && i.category == category && i.owner_id == context.user_id)
        .collect();

    if options.is_empty() {
        return TransitionResult::new(FlowState::Browsing {
            step: BrowseStep::ShowingAds,
            session,
        })
        .with_effect(Effect::reply(Outbound::NoEligibleItems { category }));
    }

    TransitionResult::new(FlowState::Browsing {
        step: BrowseStep::SelectingOwnItemForSwap {
            options: options.clone(),
        },
        session,
    })
    .with_effect(Effect::reply(Outbound::ChooseOwnItem {
        liked_item_id,
        options,
    }))
}

fn choose_offer(
    options: &[Item],
    item_id: ItemId,
    session: BrowseSession,
    context: &SessionContext,
) -> TransitionResult {
    let liked = session.current.as_ref().map(|i| i.id);
    match liked {
        Some(liked_item_id) if options.iter().any(|i| i.id == item_id) => {
            TransitionResult::new(FlowState::Browsing {
                step: BrowseStep::SubmittingProposal { offered: item_id },
                session,
            })
            .with_effect(Effect::SubmitProposal(ProposeRequest {
                liked_item_id,
                proposer_item_id: item_id,
                proposer_id: context.user_id,
                message: None,
            }))
        }
        _ => reject_browse(
            BrowseStep::SelectingOwnItemForSwap {
                options: options.to_vec(),
            },
            session,
            ValidationError::UnknownOption,
        ),
    }
}

fn on_proposal(
    session: BrowseSession,
    context: &SessionContext,
    offered: ItemId,
    outcome: ProposeOutcome,
) -> TransitionResult {
    let liked_item_id = session.current.as_ref().map_or(0, |i| i.id);
    let result = TransitionResult::new(FlowState::Browsing {
        step: BrowseStep::ShowingAds,
        session,
    });
    match outcome {
        ProposeOutcome::Created {
            proposal_id,
            target_id,
        } => result.with_effects([
            Effect::reply(Outbound::ProposalSent { proposal_id }),
            Effect::Notify {
                user_id: target_id,
                message: Outbound::SwapProposed {
                    proposal_id,
                    liked_item_id,
                    proposer_item_id: offered,
                    proposer_id: context.user_id,
                },
            },
        ]),
        ProposeOutcome::AlreadyExists => result.with_effect(Effect::reply(Outbound::AlreadyProposed)),
    }
}

fn browsing(step: BrowseStep, session: BrowseSession) -> TransitionResult {
    let prompt = browse_prompt(&step, &session);
    TransitionResult::new(FlowState::Browsing { step, session }).with_effect(Effect::reply(prompt))
}

fn reject_browse(step: BrowseStep, session: BrowseSession, error: ValidationError) -> TransitionResult {
    let prompt = browse_prompt(&step, &session);
    TransitionResult::new(FlowState::Browsing { step, session })
        .with_effects([Effect::invalid(error), Effect::reply(prompt)])
}

fn browse_prompt(step: &BrowseStep, session: &BrowseSession) -> Outbound {
    match step {
        BrowseStep::ChoosingCategory => Outbound::ChooseBrowseCategory {
            categories: Category::ALL.to_vec(),
            filters: session.filters,
        },
        BrowseStep::ShowingAds => match &session.current {
            Some(item) => Outbound::ShowItem { item: item.clone() },
            None => Outbound::NoMoreItems,
        },
        BrowseStep::SelectingOwnItemForSwap { options } => Outbound::ChooseOwnItem {
            liked_item_id: session.current.as_ref().map_or(0, |i| i.id),
            options: options.clone(),
        },
        BrowseStep::FetchingCandidate
        | BrowseStep::LoadingOwnItems
        | BrowseStep::SubmittingProposal { .. } => Outbound::StillWorking,
    }
}

fn describe_state(state: &FlowState) -> &'static str {
    match state {
        FlowState::Idle => "idle",
        FlowState::CreatingItem { .. } => "creating an item",
        FlowState::Browsing { .. } => "browsing",
    }
}

fn describe_event(event: &Event) -> &'static str {
    match event {
        Event::Input(_) => "user input",
        Event::CandidateFetched { .. } => "candidate result",
        Event::OwnItemsLoaded { .. } => "own items",
        Event::ItemCreated { .. } => "item creation result",
        Event::ProposalSubmitted { .. } => "proposal result",
        Event::FavoriteAdded { .. } => "favorite result",
        Event::OperationFailed { .. } => "failure",
    }
}
