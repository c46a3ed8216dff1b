mod interaction;
mod model;
mod reconcile;
mod view;

pub(in crate::app) use model::{Edge, EdgeKey, EdgeKind, Graph, Node, NodeInfo, NodeKind};
pub(in crate::app) use reconcile::{ReconcileConfig, ReconcileContext, ReconcileSummary, reconcile};
