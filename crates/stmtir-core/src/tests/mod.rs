/*! Scope handling, memory reuse and location-aware IR construction.
 *
 * Lowering relies on `Context` to release scratch memory and restore flags on every exit path,
 * and on the builders to compute addresses that never straddle a neighbouring variable.
 */

mod type_tests;
