//! Event-driven page navigation.
//!
//! Every [`AppEvent`] is classified by its `(pageType, actionType)` pair through
//! [`transition`], a static table producing a [`NavigationAction`]. The
//! [`Navigator`] renders that action into a [`Route`] using the event and the
//! remembered [`EntitySelections`], running the one side effect the table knows
//! about (adding an exercise to the current workout) on the way.

use std::{collections::HashMap, fmt, sync::Arc};

use shared::{
    domain::{EntityId, EntityKind, Exercise, WorkoutExercise},
    protocol::{ActionType, AppEvent, PageType},
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    data_client::{create_entity, DataClient},
    entity_store::EntityStore,
};

pub const HOME_ROUTE: &str = "/";

const WORKOUTS: &str = "workouts";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn home() -> Self {
        Self(HOME_ROUTE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_home(&self) -> bool {
        self.0 == HOME_ROUTE
    }
}

impl Default for Route {
    fn default() -> Self {
        Self::home()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last selected id per entity type for one navigation session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySelections {
    selected: HashMap<String, String>,
}

impl EntitySelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, entity: impl Into<String>, id: impl ToString) {
        self.selected.insert(entity.into(), id.to_string());
    }

    pub fn get(&self, entity: &str) -> Option<&str> {
        self.selected.get(entity).map(String::as_str)
    }

    pub fn get_id(&self, entity: &str) -> Option<EntityId> {
        self.get(entity)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(EntityId)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Route shapes the table can point at. `{E}` is the event entity, `{N}` the
/// event entity id and `{W}` the remembered workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTemplate {
    /// `/`
    Home,
    /// A fixed application route such as `/app/find`.
    Fixed(&'static str),
    /// `/{E}`
    EntityList,
    /// `/{E}/new`
    EntityNew,
    /// `/{E}/{N}`
    EntityDetail,
    /// `/app/find/{E}-selection/{E}/{N}`
    Selection,
    /// `/workouts/{W}`
    CurrentWorkout,
}

impl RouteTemplate {
    /// Fills the template in. `None` when an input it needs is absent.
    pub fn render(&self, event: &AppEvent, selections: &EntitySelections) -> Option<Route> {
        let entity = event.entity.trim();
        let entity = (!entity.is_empty()).then_some(entity);
        let route = match self {
            RouteTemplate::Home => HOME_ROUTE.to_string(),
            RouteTemplate::Fixed(path) => (*path).to_string(),
            RouteTemplate::EntityList => format!("/{}", entity?),
            RouteTemplate::EntityNew => format!("/{}/new", entity?),
            RouteTemplate::EntityDetail => format!("/{}/{}", entity?, event.entity_id?),
            RouteTemplate::Selection => {
                let entity = entity?;
                format!("/app/find/{entity}-selection/{entity}/{}", event.entity_id?)
            }
            RouteTemplate::CurrentWorkout => format!("/{WORKOUTS}/{}", selections.get(WORKOUTS)?),
        };
        Some(Route(route))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Save a workout/exercise join row for the remembered workout, then go
    /// back to that workout.
    AddToCurrentWorkout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAction {
    RouteTo(RouteTemplate),
    RouteWithSideEffect(SideEffect),
    Unknown,
}

/// The navigation table.
pub fn transition(page: &PageType, action: &ActionType) -> NavigationAction {
    use ActionType as A;
    use NavigationAction::{RouteTo, RouteWithSideEffect, Unknown};
    use RouteTemplate as T;

    match page {
        PageType::AppHome => match action {
            A::FindRequest => RouteTo(T::Fixed("/app/find")),
            A::BuildRequest => RouteTo(T::Fixed("/app/builder")),
            A::ControlRequest => RouteTo(T::Fixed("/app/control")),
            A::ListRequest => RouteTo(T::EntityList),
            A::HomeRequest => RouteTo(T::Home),
            _ => Unknown,
        },
        PageType::Control => match action {
            A::ListRequest => RouteTo(T::EntityList),
            A::NewRequest => RouteTo(T::EntityNew),
            A::CancelRequest => RouteTo(T::Home),
            _ => Unknown,
        },
        PageType::ComboSearch => match action {
            A::CancelRequest => RouteTo(T::Fixed("/app/find")),
            _ => RouteTo(T::Selection),
        },
        PageType::List => match action {
            A::EditRequest => RouteTo(T::EntityDetail),
            A::NewRequest => RouteTo(T::EntityNew),
            A::CancelRequest => RouteTo(T::Home),
            A::Delete => RouteTo(T::EntityList),
            _ => Unknown,
        },
        PageType::New => match action {
            A::Create | A::CancelRequest => RouteTo(T::EntityList),
            _ => Unknown,
        },
        PageType::Edit => match action {
            A::Update | A::Delete | A::CancelRequest => RouteTo(T::EntityList),
            A::EditRequest => RouteTo(T::EntityDetail),
            A::BuildRequest => RouteTo(T::Fixed("/app/builder")),
            _ => Unknown,
        },
        PageType::Builder => match action {
            A::Add => RouteWithSideEffect(SideEffect::AddToCurrentWorkout),
            A::CancelRequest => RouteTo(T::CurrentWorkout),
            _ => Unknown,
        },
        PageType::Other(_) => match action {
            A::EditRequest => RouteTo(T::EntityDetail),
            A::NewRequest => RouteTo(T::EntityNew),
            A::ListRequest | A::CancelRequest | A::Update | A::Delete | A::Create => {
                RouteTo(T::EntityList)
            }
            _ => Unknown,
        },
    }
}

/// Action types that record the event's entity id as the current selection.
fn remembers_selection(action: &ActionType) -> bool {
    matches!(action, ActionType::EditRequest | ActionType::BuildRequest)
}

pub struct Navigator {
    client: Arc<dyn DataClient>,
    selections: EntitySelections,
}

impl Navigator {
    pub fn new(client: Arc<dyn DataClient>) -> Self {
        Self {
            client,
            selections: EntitySelections::new(),
        }
    }

    pub fn selections(&self) -> &EntitySelections {
        &self.selections
    }

    pub fn selections_mut(&mut self) -> &mut EntitySelections {
        &mut self.selections
    }

    /// Computes the next route for `event`. Never fails: anything it cannot
    /// route is logged and sent home.
    pub async fn dispatch(&mut self, event: &AppEvent) -> Route {
        let Some(action) = event.action_type.as_ref() else {
            warn!(page = %event.page_type, entity = %event.entity, "nav: event without action type");
            return Route::home();
        };

        if remembers_selection(action) {
            if let Some(id) = event.entity_id {
                self.selections.remember(event.entity.clone(), id);
            }
        }

        let route = match transition(&event.page_type, action) {
            NavigationAction::RouteTo(template) => template.render(event, &self.selections),
            NavigationAction::RouteWithSideEffect(SideEffect::AddToCurrentWorkout) => {
                self.add_to_current_workout(event).await
            }
            NavigationAction::Unknown => {
                warn!(
                    page = %event.page_type,
                    action = %action,
                    entity = %event.entity,
                    "nav: unknown page/action combination"
                );
                None
            }
        };

        match route {
            Some(route) => {
                debug!(page = %event.page_type, action = %action, %route, "nav: routed");
                route
            }
            None => {
                warn!(
                    page = %event.page_type,
                    action = %action,
                    entity = %event.entity,
                    entity_id = ?event.entity_id,
                    "nav: route inputs missing; going home"
                );
                Route::home()
            }
        }
    }

    async fn add_to_current_workout(&self, event: &AppEvent) -> Option<Route> {
        let workout_id = self.selections.get_id(WORKOUTS)?;
        let back = Route(format!("/{WORKOUTS}/{workout_id}"));

        let Some(exercise_id) = event.entity_id else {
            warn!(%workout_id, "nav: builder add without an entity id");
            return Some(back);
        };
        if event.entity.parse::<EntityKind>().ok() != Some(EntityKind::Exercises) {
            warn!(entity = %event.entity, "nav: builder can only add exercises");
            return Some(back);
        }

        match self.save_workout_exercise(workout_id, exercise_id).await {
            Ok(saved) => info!(
                %workout_id,
                %exercise_id,
                join_id = %saved.id,
                "nav: exercise added to workout"
            ),
            Err(error) => error!(
                %workout_id,
                %exercise_id,
                error = %format!("{error:#}"),
                "nav: failed to add exercise to workout"
            ),
        }
        Some(back)
    }

    async fn save_workout_exercise(
        &self,
        workout_id: EntityId,
        exercise_id: EntityId,
    ) -> anyhow::Result<WorkoutExercise> {
        let exercises = EntityStore::<Exercise>::fetch_all(self.client.as_ref()).await?;
        let exercise = exercises
            .get(exercise_id)
            .ok_or_else(|| anyhow::anyhow!("exercise {exercise_id} is not loaded"))?;
        let placed = EntityStore::<WorkoutExercise>::fetch_all(self.client.as_ref()).await?;
        let position = placed
            .iter()
            .filter(|entry| entry.workout_id == workout_id)
            .count() as i64
            + 1;

        let join = WorkoutExercise {
            id: placed.next_id(),
            workout_id,
            exercise_id,
            name: exercise.name.clone(),
            position: Some(position),
        };
        create_entity(self.client.as_ref(), &join).await
    }
}

/// Dispatches every event published on `events` (last value wins) and
/// publishes the resulting route. Returns the navigator once either side of
/// the loop goes away.
pub async fn run_dispatch_loop(
    mut navigator: Navigator,
    mut events: watch::Receiver<Option<AppEvent>>,
    routes: watch::Sender<Route>,
) -> Navigator {
    while events.changed().await.is_ok() {
        let event = events.borrow_and_update().clone();
        let Some(event) = event else {
            continue;
        };
        let route = navigator.dispatch(&event).await;
        if routes.send(route).is_err() {
            break;
        }
    }
    navigator
}

#[cfg(test)]
#[path = "tests/navigation_tests.rs"]
mod tests;
