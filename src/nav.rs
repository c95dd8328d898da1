use crate::catalog::{Catalog, Category, Video};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Trending,
    Your,
}

impl Tab {
    pub fn category(self) -> Category {
        match self {
            Tab::Trending => Category::Trending,
            Tab::Your => Category::Your,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Trending => "Trending",
            Tab::Your => "Your videos",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Tab::Trending => Tab::Your,
            Tab::Your => Tab::Trending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Wheel delta that must be exceeded to switch tabs.
    pub wheel: i32,
    /// Vertical drag distance (rows) that must be exceeded to switch tabs.
    pub swipe_vertical: i32,
    /// Horizontal drag distance (columns) that must be exceeded to change video.
    pub swipe_horizontal: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            wheel: 2,
            swipe_vertical: 3,
            swipe_horizontal: 6,
        }
    }
}

/// What a gesture resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    SwitchTab(Tab),
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Active tab plus position inside that tab's slice of the catalog.
#[derive(Debug, Clone)]
pub struct Navigator {
    tab: Tab,
    index: usize,
    thresholds: Thresholds,
}

impl Navigator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            tab: Tab::default(),
            index: 0,
            thresholds,
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn filtered<'a>(&self, catalog: &'a Catalog) -> Vec<&'a Video> {
        catalog.by_category(self.tab.category())
    }

    pub fn current<'a>(&self, catalog: &'a Catalog) -> Option<&'a Video> {
        self.filtered(catalog).get(self.index).copied()
    }

    /// Selects `tab`; the index resets to 0 when it no longer fits.
    pub fn set_tab(&mut self, tab: Tab, catalog: &Catalog) {
        self.tab = tab;
        if self.index >= self.filtered(catalog).len() {
            self.index = 0;
        }
    }

    pub fn next(&mut self, catalog: &Catalog) {
        let len = self.filtered(catalog).len().max(1);
        self.index = (self.index + 1) % len;
    }

    pub fn previous(&mut self, catalog: &Catalog) {
        let len = self.filtered(catalog).len().max(1);
        self.index = (self.index + len - 1) % len;
    }

    pub fn apply(&mut self, action: Action, catalog: &Catalog) {
        match action {
            Action::None => {}
            Action::SwitchTab(tab) => self.set_tab(tab, catalog),
            Action::Next => self.next(catalog),
            Action::Previous => self.previous(catalog),
        }
    }

    /// Positive `delta` scrolls down. Only trending→your on the way down and
    /// your→trending on the way up; the other combinations do nothing.
    pub fn wheel_action(&self, delta: i32) -> Action {
        if delta.abs() <= self.thresholds.wheel {
            return Action::None;
        }
        self.vertical_action(delta)
    }

    /// Keyboard equivalent of a wheel gesture past the threshold.
    pub fn scroll_action(&self, down: bool) -> Action {
        self.vertical_action(if down { 1 } else { -1 })
    }

    /// Classifies a drag from `start` to `end` by its dominant axis.
    /// Dragging left shows the next video, dragging right the previous one.
    /// Vertical drags follow the content like a touch swipe: dragging up
    /// reads as scrolling down.
    pub fn swipe_action(&self, start: Point, end: Point) -> Action {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        if dy.abs() > dx.abs() {
            if dy.abs() > self.thresholds.swipe_vertical {
                return self.vertical_action(-dy);
            }
        } else if dx.abs() > self.thresholds.swipe_horizontal {
            return if dx < 0 { Action::Next } else { Action::Previous };
        }
        Action::None
    }

    /// Clicks left of the surface midpoint go back, the rest go forward.
    pub fn click_action(&self, x: i32, surface_left: i32, surface_width: i32) -> Action {
        let midpoint = surface_left + surface_width / 2;
        if x < midpoint {
            Action::Previous
        } else {
            Action::Next
        }
    }

    fn vertical_action(&self, delta: i32) -> Action {
        match (self.tab, delta > 0) {
            (Tab::Trending, true) => Action::SwitchTab(Tab::Your),
            (Tab::Your, false) => Action::SwitchTab(Tab::Trending),
            _ => Action::None,
        }
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
