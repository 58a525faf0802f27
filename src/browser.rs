use std::{num::NonZeroUsize, sync::Arc};

use tokio::sync::watch;

use crate::collection::{CollectionController, EventView};
use crate::models::Event;
use crate::pagination::{PaginationState, Paginator};

/// An event on the current page together with its registration badge.
#[derive(Debug, Clone, Copy)]
pub struct EventCard<'a> {
    pub event: &'a Event,
    pub registered: bool,
}

/// Pages through the controller's derived view, re-syncing whenever a new
/// view is published.
pub struct EventBrowser {
    controller: Arc<CollectionController>,
    views: watch::Receiver<EventView>,
    paginator: Paginator<Event>,
    revision: u64,
}

impl EventBrowser {
    pub fn new(controller: Arc<CollectionController>, items_per_page: NonZeroUsize) -> Self {
        let views = controller.subscribe();
        let mut browser = Self {
            controller,
            views,
            paginator: Paginator::new(items_per_page),
            revision: 0,
        };
        browser.apply_latest();
        browser
    }

    /// Picks up a newly published view, if any. Returns true when the page
    /// contents may have changed.
    pub fn sync(&mut self) -> bool {
        match self.views.has_changed() {
            Ok(true) => {
                self.apply_latest();
                true
            }
            _ => false,
        }
    }

    /// Waits for the next published view and applies it. Returns false if
    /// the view channel has closed.
    pub async fn next_view(&mut self) -> bool {
        if self.views.changed().await.is_err() {
            return false;
        }
        self.apply_latest();
        true
    }

    fn apply_latest(&mut self) {
        let view = self.views.borrow_and_update().clone();
        self.revision = view.revision;
        self.paginator.set_items(view.events);
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn controller(&self) -> &CollectionController {
        &self.controller
    }

    pub fn paginator(&self) -> &Paginator<Event> {
        &self.paginator
    }

    pub fn paginator_mut(&mut self) -> &mut Paginator<Event> {
        &mut self.paginator
    }

    pub fn page(&self) -> &[Event] {
        self.paginator.current_items()
    }

    pub fn cards(&self) -> Vec<EventCard<'_>> {
        self.page()
            .iter()
            .map(|event| EventCard {
                event,
                registered: self.controller.is_registered(event.id),
            })
            .collect()
    }

    pub fn state(&self) -> PaginationState {
        self.paginator.state()
    }
}
