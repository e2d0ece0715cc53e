//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::catalog::Category;
use crate::config::FlowLimits;
use crate::db::{Item, ItemStatus};
use crate::geo::GeoPoint;
use crate::market::{BrowseFilters, ErrorKind, PriceFilter};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(with_location: bool) -> SessionContext {
    let context = SessionContext::new(1, FlowLimits::default());
    if with_location {
        context.with_location(GeoPoint { lat: 10.0, lon: 20.0 }, Some("Home".to_string()))
    } else {
        context
    }
}

fn make_item(id: i64, owner_id: i64, category: Category, price: Option<u64>, photo: bool) -> Item {
    let now = chrono::Utc::now();
    Item {
        id,
        owner_id,
        category,
        title: format!("item {id}"),
        description: "desc".to_string(),
        price,
        photo: photo.then(|| "photo".to_string()),
        location: None,
        location_label: None,
        views: 0,
        status: ItemStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Electronics),
        Just(Category::Clothing),
        Just(Category::Home),
        Just(Category::Hobbies),
        Just(Category::Free),
    ]
}

fn arb_price_filter() -> impl Strategy<Value = PriceFilter> {
    prop_oneof![
        Just(PriceFilter::Any),
        Just(PriceFilter::FreeOnly),
        (0u64..1000).prop_map(PriceFilter::AtMost),
        (0u64..1000).prop_map(PriceFilter::AtLeast),
    ]
}

fn arb_filters() -> impl Strategy<Value = BrowseFilters> {
    (
        proptest::option::of(-5.0f64..200.0),
        arb_price_filter(),
        any::<bool>(),
    )
        .prop_map(|(radius_km, price, photo_only)| BrowseFilters {
            radius_km,
            price,
            photo_only,
        })
}

fn arb_item() -> impl Strategy<Value = Item> {
    (
        1i64..50,
        1i64..4,
        arb_category(),
        proptest::option::of(1u64..1000),
        any::<bool>(),
    )
        .prop_map(|(id, owner, category, price, photo)| make_item(id, owner, category, price, photo))
}

fn arb_user_input() -> impl Strategy<Value = UserInput> {
    prop_oneof![
        Just(UserInput::StartCreateItem),
        Just(UserInput::StartBrowse),
        Just(UserInput::MainMenu),
        Just(UserInput::Cancel),
        Just(UserInput::Back),
        Just(UserInput::Skip),
        "[a-zA-Z0-9 ]{0,20}".prop_map(|text| UserInput::Text { text }),
        // Long text exercises the length limits
        "[a-z]{140,600}".prop_map(|text| UserInput::Text { text }),
        arb_category().prop_map(|category| UserInput::Category { category }),
        "[a-z0-9]{0,10}".prop_map(|reference| UserInput::Photo { reference }),
        (-100.0f64..100.0, -200.0f64..200.0).prop_map(|(lat, lon)| UserInput::Location { lat, lon }),
        any::<bool>().prop_map(|yes| UserInput::Confirm { yes }),
        arb_filters().prop_map(|filters| UserInput::SetFilters { filters }),
        Just(UserInput::ProposeSwap),
        (1i64..50).prop_map(|item_id| UserInput::SelectOwnItem { item_id }),
        Just(UserInput::AddFavorite),
    ]
}

fn arb_create_step() -> impl Strategy<Value = CreateStep> {
    prop_oneof![
        Just(CreateStep::ChoosingCategory),
        Just(CreateStep::EnteringTitle),
        Just(CreateStep::EnteringDescription),
        Just(CreateStep::EnteringPrice),
        Just(CreateStep::AwaitingPhoto),
        Just(CreateStep::AwaitingLocation),
        Just(CreateStep::Confirming),
        Just(CreateStep::Submitting),
    ]
}

fn arb_draft() -> impl Strategy<Value = ItemDraft> {
    (
        proptest::option::of(arb_category()),
        proptest::option::of("[a-z]{1,10}"),
        proptest::option::of("[a-z]{1,30}"),
        proptest::option::of(1u64..1000),
        any::<bool>(),
    )
        .prop_map(|(category, title, description, price, asked_location)| ItemDraft {
            category,
            title,
            description,
            price,
            asked_location,
            ..ItemDraft::default()
        })
}

fn arb_browse_step() -> impl Strategy<Value = BrowseStep> {
    prop_oneof![
        Just(BrowseStep::ChoosingCategory),
        Just(BrowseStep::FetchingCandidate),
        Just(BrowseStep::ShowingAds),
        Just(BrowseStep::LoadingOwnItems),
        proptest::collection::vec(arb_item(), 0..3)
            .prop_map(|options| BrowseStep::SelectingOwnItemForSwap { options }),
        (1i64..50).prop_map(|offered| BrowseStep::SubmittingProposal { offered }),
    ]
}

fn arb_browse_session() -> impl Strategy<Value = BrowseSession> {
    (
        proptest::option::of(arb_category()),
        arb_filters(),
        0i64..50,
        proptest::option::of(arb_item()),
        proptest::collection::btree_set(1i64..50, 0..5),
    )
        .prop_map(|(category, filters, cursor, current, visited)| BrowseSession {
            category,
            filters,
            cursor,
            origin: None,
            current,
            visited,
        })
}

fn arb_state() -> impl Strategy<Value = FlowState> {
    prop_oneof![
        Just(FlowState::Idle),
        (arb_create_step(), arb_draft())
            .prop_map(|(step, draft)| FlowState::CreatingItem { step, draft }),
        (arb_browse_step(), arb_browse_session())
            .prop_map(|(step, session)| FlowState::Browsing { step, session }),
    ]
}

fn arb_outcome_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        proptest::option::of(arb_item()).prop_map(|item| Event::CandidateFetched { item }),
        proptest::collection::vec(arb_item(), 0..3).prop_map(|items| Event::OwnItemsLoaded { items }),
        (1i64..50).prop_map(|item_id| Event::ItemCreated { item_id }),
        any::<bool>().prop_map(|newly| Event::FavoriteAdded { newly }),
        Just(Event::OperationFailed {
            kind: ErrorKind::Repository,
            message: "boom".to_string(),
        }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// User input is never an error, whatever the state
    #[test]
    fn prop_user_input_never_fails(
        state in arb_state(),
        input in arb_user_input(),
        with_location in any::<bool>(),
    ) {
        let result = transition(&state, &test_context(with_location), Event::Input(input));
        prop_assert!(result.is_ok());
    }

    /// Every user input gets at least one effect back, so nothing is silent
    #[test]
    fn prop_user_input_always_answered(state in arb_state(), input in arb_user_input()) {
        let result = transition(&state, &test_context(false), Event::Input(input)).unwrap();
        prop_assert!(!result.effects.is_empty());
    }

    /// Cancel and main menu always clear the session
    #[test]
    fn prop_cancel_clears_session(state in arb_state(), menu in any::<bool>()) {
        let input = if menu { UserInput::MainMenu } else { UserInput::Cancel };
        let result = transition(&state, &test_context(false), Event::Input(input)).unwrap();
        prop_assert!(result.new_state.is_idle());
    }

    /// Effect outcomes never apply to an idle session
    #[test]
    fn prop_outcomes_rejected_when_idle(event in arb_outcome_event()) {
        prop_assert!(transition(&FlowState::Idle, &test_context(false), event).is_err());
    }

    /// A failure outcome in any active state clears the session
    #[test]
    fn prop_failure_clears_active_session(state in arb_state()) {
        prop_assume!(!state.is_idle());
        let event = Event::OperationFailed {
            kind: ErrorKind::NotFound,
            message: "gone".to_string(),
        };
        let result = transition(&state, &test_context(false), event).unwrap();
        prop_assert!(result.new_state.is_idle());
    }

    /// Rejected input leaves the create flow where it was
    #[test]
    fn prop_invalid_create_input_does_not_advance(
        step in arb_create_step(),
        draft in arb_draft(),
        input in arb_user_input(),
    ) {
        let state = FlowState::CreatingItem { step, draft };
        let result = transition(&state, &test_context(false), Event::Input(input)).unwrap();
        let rejected = result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Reply(Outbound::InvalidInput { .. })));
        if rejected {
            prop_assert_eq!(result.new_state, state);
        }
    }

    /// Browsing never shows an item twice in one pass and the cursor always
    /// lands on the last fetched id
    #[test]
    fn prop_candidate_bookkeeping(session in arb_browse_session(), item in arb_item()) {
        prop_assume!(session.category.is_some());
        let state = FlowState::Browsing { step: BrowseStep::FetchingCandidate, session: session.clone() };
        let result = transition(
            &state,
            &test_context(false),
            Event::CandidateFetched { item: Some(item.clone()) },
        )
        .unwrap();

        if session.visited.contains(&item.id) {
            prop_assert!(result.new_state.is_idle());
        } else {
            let FlowState::Browsing { session: next, .. } = &result.new_state else {
                return Err(TestCaseError::fail("left browsing on a fresh candidate"));
            };
            prop_assert_eq!(next.cursor, item.id);
            prop_assert!(next.visited.contains(&item.id));
            let shown = result
                .effects
                .iter()
                .any(|e| matches!(e, Effect::Reply(Outbound::ShowItem { .. })));
            prop_assert_eq!(shown, session.filters.matches(&item));
        }
    }

    /// Offers only ever list the viewer's active items in the liked category
    #[test]
    fn prop_offer_options_match_category(
        session in arb_browse_session(),
        items in proptest::collection::vec(arb_item(), 0..6),
    ) {
        prop_assume!(session.current.is_some());
        let liked_category = session.current.as_ref().map(|i| i.category);
        let state = FlowState::Browsing { step: BrowseStep::LoadingOwnItems, session };
        let result = transition(&state, &test_context(false), Event::OwnItemsLoaded { items }).unwrap();

        if let FlowState::Browsing { step: BrowseStep::SelectingOwnItemForSwap { options }, .. } = &result.new_state {
            prop_assert!(!options.is_empty());
            for option in options {
                prop_assert_eq!(Some(option.category), liked_category);
                prop_assert_eq!(option.owner_id, 1);
            }
        }
    }
}
