//! Multi-view ledger state.
//!
//! [`ViewGraph`] holds every known candidate block of one chain as a tree
//! rooted at the final view and derives two pointers from it:
//!
//! - **best**: highest view, ties broken by earlier produce time, then by
//!   smaller hash
//! - **final**: the most recent ancestor of best that can no longer be
//!   reverted under the finality rule of the inserted view's version
//!
//! Finality rules:
//!
//! ```text
//! Legacy:     final = parent(best)
//!
//! MultiView:  v0 <- v1 <- v2 = best
//!             final = v0  iff  slot(v0) + 1 == slot(v1)
//!                         and  slot(v1) + 1 == slot(v2)
//!             (propose-time slots, else produce-time slots)
//! ```
//!
//! Final only moves forward, to a descendant of the current final view.
//! Every view not descended from the new final is dropped in the same step,
//! so the graph always stays a single tree rooted at final.
//!
//! [`MultiView`] wraps a graph in a single-consumer actor. Mutations and
//! graph queries are serialized through its command channel; best and final
//! are published through a `watch` channel so tip readers never wait on
//! pending mutations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use meridian_types::{ConsensusVersion, View, H256};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace};

use crate::timeout::timeslot_of;

const COMMAND_BUFFER: usize = 256;

/// Best and final view of a graph at one instant
#[derive(Debug, Clone, Default)]
pub struct Tips {
    /// Locally preferred tip
    pub best: Option<Arc<View>>,
    /// Irreversible view
    pub final_view: Option<Arc<View>>,
}

/// Tree of candidate views with derived best and final pointers
#[derive(Debug, Clone)]
pub struct ViewGraph {
    timeslot: Duration,
    views: HashMap<H256, Arc<View>>,
    children: HashMap<H256, Vec<H256>>,
    best: Option<Arc<View>>,
    final_view: Option<Arc<View>>,
}

impl ViewGraph {
    /// Create an empty graph using `timeslot` for the multi-view rule
    pub fn new(timeslot: Duration) -> Self {
        Self {
            timeslot,
            views: HashMap::new(),
            children: HashMap::new(),
            best: None,
            final_view: None,
        }
    }

    /// Insert a view.
    ///
    /// The first view of an empty graph becomes both best and final. Later
    /// views are accepted only if they are new and their parent is final or
    /// a descendant of it; duplicates, orphans and views on a branch that
    /// conflicts with final are dropped and leave the graph untouched.
    pub fn add_view(&mut self, view: Arc<View>) -> bool {
        let hash = view.hash();

        if self.views.is_empty() {
            self.views.insert(hash, view.clone());
            self.best = Some(view.clone());
            self.final_view = Some(view);
            debug!(block_hash = %hash.short(), "View graph rooted");
            return true;
        }

        if self.views.contains_key(&hash) {
            trace!(block_hash = %hash.short(), "Duplicate view");
            return false;
        }
        let parent = view.parent_hash();
        let Some(parent_view) = self.views.get(&parent) else {
            trace!(
                block_hash = %hash.short(),
                parent_hash = %parent.short(),
                "Orphan view"
            );
            return false;
        };
        if let Some(final_view) = &self.final_view {
            if !self.descends_from(parent_view, final_view) {
                debug!(
                    block_hash = %hash.short(),
                    parent_hash = %parent.short(),
                    final_height = final_view.height(),
                    "View conflicts with final"
                );
                return false;
            }
        }

        let version = view.version();
        self.views.insert(hash, view.clone());
        self.children.entry(parent).or_default().push(hash);

        self.update_best(view);
        if self.update_final(version) {
            self.collect_garbage();
        }
        true
    }

    /// View by hash, `None` if unknown or below the final height
    pub fn get(&self, hash: &H256) -> Option<Arc<View>> {
        let view = self.views.get(hash)?;
        match &self.final_view {
            Some(final_view) if view.height() < final_view.height() => None,
            _ => Some(view.clone()),
        }
    }

    /// Current best view
    pub fn best(&self) -> Option<Arc<View>> {
        self.best.clone()
    }

    /// Current final view
    pub fn final_view(&self) -> Option<Arc<View>> {
        self.final_view.clone()
    }

    /// Best and final together
    pub fn tips(&self) -> Tips {
        Tips {
            best: self.best.clone(),
            final_view: self.final_view.clone(),
        }
    }

    /// Every view reachable from final, breadth first
    pub fn bfs(&self) -> Vec<Arc<View>> {
        let Some(root) = &self.final_view else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.views.len());
        let mut queue = VecDeque::from([root.hash()]);
        while let Some(hash) = queue.pop_front() {
            if let Some(view) = self.views.get(&hash) {
                out.push(view.clone());
            }
            if let Some(children) = self.children.get(&hash) {
                queue.extend(children.iter().copied());
            }
        }
        out
    }

    /// Number of views held
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Whether a view is held
    pub fn contains(&self, hash: &H256) -> bool {
        self.views.contains_key(hash)
    }

    /// Drop every view
    pub fn clear(&mut self) {
        self.views.clear();
        self.children.clear();
        self.best = None;
        self.final_view = None;
    }

    fn update_best(&mut self, view: Arc<View>) {
        let replace = match &self.best {
            None => true,
            Some(best) => {
                view.height() > best.height()
                    || (view.height() == best.height()
                        && (view.produce_time() < best.produce_time()
                            || (view.produce_time() == best.produce_time()
                                && view.hash() < best.hash())))
            }
        };
        if replace {
            trace!(
                height = view.height(),
                block_hash = %view.hash().short(),
                "Best view updated"
            );
            self.best = Some(view);
        }
    }

    fn update_final(&mut self, version: ConsensusVersion) -> bool {
        let Some(best) = self.best.clone() else {
            return false;
        };
        let candidate = match version {
            ConsensusVersion::Legacy => self.views.get(&best.parent_hash()).cloned(),
            ConsensusVersion::MultiView => self.multiview_candidate(&best),
        };
        let Some(candidate) = candidate else {
            return false;
        };

        if let Some(current) = &self.final_view {
            if candidate.height() <= current.height() || !self.descends_from(&candidate, current) {
                return false;
            }
        }

        info!(
            height = candidate.height(),
            block_hash = %candidate.hash().short(),
            rule = %version,
            "Final view advanced"
        );
        self.final_view = Some(candidate);
        true
    }

    fn multiview_candidate(&self, best: &View) -> Option<Arc<View>> {
        let v1 = self.views.get(&best.parent_hash())?;
        let v0 = self.views.get(&v1.parent_hash())?;

        let slot = |ts: i64| timeslot_of(ts, self.timeslot);
        let sequential = |time: fn(&View) -> i64| {
            let (s0, s1, s2) = (slot(time(v0.as_ref())), slot(time(v1.as_ref())), slot(time(best)));
            s0 + 1 == s1 && s1 + 1 == s2
        };

        if sequential(View::propose_time) || sequential(View::produce_time) {
            Some(v0.clone())
        } else {
            None
        }
    }

    fn descends_from(&self, view: &View, ancestor: &View) -> bool {
        let mut hash = view.hash();
        let mut height = view.height();
        while height > ancestor.height() {
            match self.views.get(&hash) {
                Some(v) => {
                    hash = v.parent_hash();
                    height = height.saturating_sub(1);
                }
                None => return false,
            }
        }
        hash == ancestor.hash()
    }

    fn collect_garbage(&mut self) {
        let Some(root) = self.final_view.as_ref().map(|v| v.hash()) else {
            return;
        };
        let mut keep = HashSet::with_capacity(self.views.len());
        let mut queue = VecDeque::from([root]);
        while let Some(hash) = queue.pop_front() {
            if keep.insert(hash) {
                if let Some(children) = self.children.get(&hash) {
                    queue.extend(children.iter().copied());
                }
            }
        }

        let before = self.views.len();
        self.views.retain(|hash, _| keep.contains(hash));
        self.children.retain(|hash, _| keep.contains(hash));
        let removed = before - self.views.len();
        if removed > 0 {
            debug!(removed, remaining = self.views.len(), "Pruned views off the final branch");
        }
    }
}

enum Command {
    AddView(Arc<View>, oneshot::Sender<bool>),
    Get(H256, oneshot::Sender<Option<Arc<View>>>),
    Bfs(oneshot::Sender<Vec<Arc<View>>>),
    Len(oneshot::Sender<usize>),
    Contains(H256, oneshot::Sender<bool>),
    Snapshot(oneshot::Sender<ViewGraph>),
    Reset(oneshot::Sender<()>),
}

/// Handle to a view graph owned by a background task.
///
/// Clones share the same graph. The task exits once every handle is dropped.
/// After that, `add_view` returns `false` and queries come back empty.
/// Must be created inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct MultiView {
    commands: mpsc::Sender<Command>,
    tips: watch::Receiver<Tips>,
}

impl MultiView {
    /// Spawn an empty graph
    pub fn new(timeslot: Duration) -> Self {
        Self::spawn(ViewGraph::new(timeslot))
    }

    /// Spawn an actor owning `graph`
    pub fn spawn(graph: ViewGraph) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (tips_tx, tips) = watch::channel(graph.tips());
        tokio::spawn(run(graph, rx, tips_tx));
        Self { commands, tips }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Insert a view; see [`ViewGraph::add_view`]
    pub async fn add_view(&self, view: Arc<View>) -> bool {
        self.request(|tx| Command::AddView(view, tx))
            .await
            .unwrap_or(false)
    }

    /// View by hash, `None` if unknown or below the final height
    pub async fn get_view_by_hash(&self, hash: H256) -> Option<Arc<View>> {
        self.request(|tx| Command::Get(hash, tx)).await.flatten()
    }

    /// Current best view
    pub fn best_view(&self) -> Option<Arc<View>> {
        self.tips.borrow().best.clone()
    }

    /// Current final view
    pub fn final_view(&self) -> Option<Arc<View>> {
        self.tips.borrow().final_view.clone()
    }

    /// Best and final from the same snapshot
    pub fn tips(&self) -> Tips {
        self.tips.borrow().clone()
    }

    /// Receiver notified whenever best or final changes
    pub fn subscribe(&self) -> watch::Receiver<Tips> {
        self.tips.clone()
    }

    /// Every view reachable from final, breadth first
    pub async fn all_views_bfs(&self) -> Vec<Arc<View>> {
        self.request(Command::Bfs).await.unwrap_or_default()
    }

    /// Number of views held
    pub async fn len(&self) -> usize {
        self.request(Command::Len).await.unwrap_or(0)
    }

    /// Whether a view is held
    pub async fn contains(&self, hash: H256) -> bool {
        self.request(|tx| Command::Contains(hash, tx))
            .await
            .unwrap_or(false)
    }

    /// Independent copy of the current graph running in its own actor
    pub async fn duplicate(&self) -> Option<MultiView> {
        let graph = self.request(Command::Snapshot).await?;
        Some(Self::spawn(graph))
    }

    /// Drop every view
    pub async fn reset(&self) {
        let _ = self.request(Command::Reset).await;
    }
}

async fn run(mut graph: ViewGraph, mut rx: mpsc::Receiver<Command>, tips: watch::Sender<Tips>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::AddView(view, reply) => {
                let added = graph.add_view(view);
                if added {
                    tips.send_replace(graph.tips());
                }
                let _ = reply.send(added);
            }
            Command::Get(hash, reply) => {
                let _ = reply.send(graph.get(&hash));
            }
            Command::Bfs(reply) => {
                let _ = reply.send(graph.bfs());
            }
            Command::Len(reply) => {
                let _ = reply.send(graph.len());
            }
            Command::Contains(hash, reply) => {
                let _ = reply.send(graph.contains(&hash));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(graph.clone());
            }
            Command::Reset(reply) => {
                graph.clear();
                tips.send_replace(graph.tips());
                let _ = reply.send(());
            }
        }
    }
    trace!("View graph actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{Block, BlockHeader, ChainKey};

    const SLOT: Duration = Duration::from_secs(10);

    fn child(parent: &View, version: ConsensusVersion, propose: i64, produce: i64) -> Arc<View> {
        let header = BlockHeader {
            version,
            height: parent.height() + 1,
            epoch: 0,
            round: 0,
            parent_hash: parent.hash(),
            proposer_index: 0,
            propose_time: propose,
            produce_time: produce,
            body_hash: H256::NIL,
        };
        Arc::new(View::new(Block::new(ChainKey::Beacon, header, Vec::new())))
    }

    fn rooted() -> (ViewGraph, Arc<View>) {
        let mut graph = ViewGraph::new(SLOT);
        let genesis = Arc::new(View::new(Block::genesis(ChainKey::Beacon, 1_000)));
        assert!(graph.add_view(genesis.clone()));
        (graph, genesis)
    }

    #[test]
    fn first_view_is_best_and_final() {
        let (graph, genesis) = rooted();
        assert_eq!(graph.best().unwrap().hash(), genesis.hash());
        assert_eq!(graph.final_view().unwrap().hash(), genesis.hash());
    }

    #[test]
    fn legacy_finalizes_parent_of_best() {
        let (mut graph, genesis) = rooted();
        let a = child(&genesis, ConsensusVersion::Legacy, 2_000, 2_000);
        let b = child(&a, ConsensusVersion::Legacy, 2_010, 2_010);
        graph.add_view(a.clone());
        assert_eq!(graph.final_view().unwrap().hash(), genesis.hash());
        graph.add_view(b.clone());
        assert_eq!(graph.final_view().unwrap().hash(), a.hash());
        // genesis is now below final and collected
        assert!(!graph.contains(&genesis.hash()));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn equal_height_prefers_earlier_produce_time() {
        let (mut graph, genesis) = rooted();
        let late = child(&genesis, ConsensusVersion::MultiView, 2_020, 2_020);
        let early = child(&genesis, ConsensusVersion::MultiView, 2_030, 2_010);
        graph.add_view(late.clone());
        graph.add_view(early.clone());
        assert_eq!(graph.best().unwrap().hash(), early.hash());
    }

    #[test]
    fn equal_produce_time_prefers_smaller_hash() {
        let (mut graph, genesis) = rooted();
        let a = child(&genesis, ConsensusVersion::MultiView, 2_020, 2_010);
        let b = child(&genesis, ConsensusVersion::MultiView, 2_030, 2_010);
        graph.add_view(a.clone());
        graph.add_view(b.clone());
        let expected = if a.hash() < b.hash() { a.hash() } else { b.hash() };
        assert_eq!(graph.best().unwrap().hash(), expected);
    }

    #[test]
    fn get_hides_views_below_final() {
        let (mut graph, genesis) = rooted();
        let a = child(&genesis, ConsensusVersion::Legacy, 2_000, 2_000);
        graph.add_view(a.clone());
        assert!(graph.get(&genesis.hash()).is_some());
        let b = child(&a, ConsensusVersion::Legacy, 2_010, 2_010);
        graph.add_view(b);
        assert!(graph.get(&genesis.hash()).is_none());
        assert!(graph.get(&a.hash()).is_some());
    }

    #[test]
    fn view_on_collected_parent_is_orphan() {
        let (mut graph, genesis) = rooted();
        let a = child(&genesis, ConsensusVersion::Legacy, 2_000, 2_000);
        let a2 = child(&a, ConsensusVersion::Legacy, 2_010, 2_010);
        graph.add_view(a.clone());
        graph.add_view(a2);
        assert_eq!(graph.final_view().unwrap().hash(), a.hash());

        let late_sibling = child(&genesis, ConsensusVersion::Legacy, 2_001, 2_001);
        assert!(!graph.add_view(late_sibling));
    }

    #[test]
    fn branch_conflicting_with_final_is_refused() {
        let (mut graph, genesis) = rooted();
        let a = child(&genesis, ConsensusVersion::Legacy, 2_000, 2_000);
        let s = child(&genesis, ConsensusVersion::Legacy, 2_005, 2_005);
        graph.add_view(a.clone());
        graph.add_view(s.clone());
        let a2 = child(&a, ConsensusVersion::Legacy, 2_010, 2_010);
        graph.add_view(a2.clone());
        assert_eq!(graph.final_view().unwrap().hash(), a.hash());

        // the sibling of final went with genesis
        assert!(!graph.contains(&s.hash()));
        let s2 = child(&s, ConsensusVersion::Legacy, 2_008, 2_008);
        assert!(!graph.add_view(s2.clone()));
        let s3 = child(&s2, ConsensusVersion::Legacy, 2_020, 2_020);
        assert!(!graph.add_view(s3));
        assert_eq!(graph.best().unwrap().hash(), a2.hash());
        assert_eq!(graph.len(), 2);

        // the final branch still advances
        let a3 = child(&a2, ConsensusVersion::Legacy, 2_030, 2_030);
        assert!(graph.add_view(a3.clone()));
        assert_eq!(graph.final_view().unwrap().hash(), a2.hash());
    }

    #[test]
    fn multiview_final_drops_forks_below_it() {
        let (mut graph, genesis) = rooted();
        let v0 = child(&genesis, ConsensusVersion::MultiView, 10, 10);
        let fork = child(&genesis, ConsensusVersion::MultiView, 25, 25);
        let fork2 = child(&fork, ConsensusVersion::MultiView, 45, 45);
        let v1 = child(&v0, ConsensusVersion::MultiView, 20, 20);
        for view in [&v0, &fork, &fork2, &v1] {
            assert!(graph.add_view(view.clone()));
        }
        assert_eq!(graph.final_view().unwrap().hash(), genesis.hash());

        let v2 = child(&v1, ConsensusVersion::MultiView, 30, 30);
        assert!(graph.add_view(v2.clone()));
        assert_eq!(graph.final_view().unwrap().hash(), v0.hash());
        // fork2 sits above final but on a branch that no longer contains it
        assert!(!graph.contains(&fork.hash()));
        assert!(!graph.contains(&fork2.hash()));
        assert!(!graph.add_view(child(&fork2, ConsensusVersion::MultiView, 55, 55)));
        assert_eq!(graph.len(), 3);
    }
}
