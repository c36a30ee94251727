// src/components/mod.rs
pub mod crop_dialog;
pub mod marker_modal;
pub mod topo_editor;
pub mod topo_viewer;
