/*!
 * NSQD EXPORTER - Pont entre les stats JSON d'un nsqd et Prometheus
 *
 * RÔLE : à chaque GET /stats?target=..., interroge le nsqd cible, réconcilie
 * son snapshot avec la topologie connue et sert l'exposition texte des séries.
 *
 * MODULES :
 * - models / labels / registry : snapshot nsqd, schéma des métriques, stockage des séries
 * - topology / reconciler : détection des disparitions, écriture d'un cycle
 * - collector / fetcher / probe : état par cible, transport HTTP, orchestration d'un probe
 * - http / state / health / config / error : surface Axum et plomberie du process
 */

pub mod collector;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod http;
pub mod labels;
pub mod models;
pub mod probe;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod topology;
