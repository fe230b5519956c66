// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes plumbing: typed stores, patches, finalizers, clients, CRD
//! discovery and namespace management.

pub mod client;
pub mod crd;
pub mod finalizers;
pub mod namespaces;
pub mod patch;
pub mod store;

pub use client::{create_client_from_kubeconfig, create_garden_client, KubeShootConnector, ShootConnector};
pub use crd::wait_for_crd;
pub use namespaces::{delete_namespace, ensure_namespace};
pub use store::{DeleteOutcome, KubeStore, ObjectStore, StoreObject};
