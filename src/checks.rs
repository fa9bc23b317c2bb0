// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Post-boot invariants checked against a paused kernel image.
// Author: Lukas Bower

//! The invariant suite: heap allocator, PMM bitmap, device mapping.
//!
//! Checks run in a fixed order so that two runs against the same snapshot
//! produce the same report. A failed query is recorded as a failing check
//! with the failure as its detail; it never skips a check and never aborts
//! the rest of the suite.

use std::io::Write;

use crate::layout::KernelLayout;
use crate::query::{QueryChannel, Width};
use crate::report::CheckRunner;
use crate::transport::Target;

/// Run every check group in order: heap, PMM, device mapping.
pub fn run_suite<T: Target, W: Write>(
    chan: &mut QueryChannel<'_, T>,
    runner: &mut CheckRunner<W>,
    layout: &KernelLayout,
) {
    heap_checks(chan, runner, layout);
    pmm_checks(chan, runner, layout);
    mapping_checks(chan, runner, layout);
}

/// Heap allocator integrity: head pointer non-null, inside the heap region,
/// and carrying the allocator's sentinel word.
fn heap_checks<T: Target, W: Write>(
    chan: &mut QueryChannel<'_, T>,
    runner: &mut CheckRunner<W>,
    layout: &KernelLayout,
) {
    let magic_name = format!("Heap head magic is 0x{:X}", layout.heap_magic);
    match chan.read_symbol(&layout.heap_head, Width::U32) {
        Ok(head) => {
            runner.check("Heap head is non-NULL", head != 0, "");
            runner.check(
                "Heap head is in heap range",
                layout.heap_low <= head && head < layout.heap_high,
                format!("head={head:#x}"),
            );
            if head == 0 {
                // A null head leaves nothing valid to dereference; the magic
                // check still gets its verdict.
                runner.check(magic_name, false, "head is NULL");
            } else {
                match chan.read_u32(head) {
                    Ok(magic) => runner.check(
                        magic_name,
                        magic == layout.heap_magic,
                        format!("magic={magic:#x}"),
                    ),
                    Err(_) => runner.check(magic_name, false, "read failed"),
                }
            }
        }
        Err(err) => {
            let detail = err.to_string();
            runner.check("Heap head is non-NULL", false, detail.clone());
            runner.check("Heap head is in heap range", false, detail.clone());
            runner.check(magic_name, false, detail);
        }
    }
}

/// PMM bitmap sanity: frame 0 reserved, discovered frame and memory counts
/// strictly positive.
fn pmm_checks<T: Target, W: Write>(
    chan: &mut QueryChannel<'_, T>,
    runner: &mut CheckRunner<W>,
    layout: &KernelLayout,
) {
    // Physical address 0 must never be handed out, so bit 0 stays set.
    match chan.read_symbol(&layout.pmm_bitmap, Width::U8) {
        Ok(byte0) => runner.check(
            "PMM frame 0 is used (bit 0 of bitmap[0])",
            byte0 & 1 == 1,
            format!("bitmap[0]={byte0:#x}"),
        ),
        Err(err) => runner.check(
            "PMM frame 0 is used (bit 0 of bitmap[0])",
            false,
            err.to_string(),
        ),
    }
    match chan.read_symbol(&layout.pmm_max_frames, Width::U64) {
        Ok(max_frames) => runner.check(
            "PMM max_frames > 0",
            max_frames > 0,
            format!("max_frames={max_frames}"),
        ),
        Err(err) => runner.check("PMM max_frames > 0", false, err.to_string()),
    }
    match chan.read_symbol(&layout.pmm_total_memory, Width::U64) {
        Ok(total_memory) => runner.check(
            "PMM total_memory > 0",
            total_memory > 0,
            format!("total_memory={total_memory}"),
        ),
        Err(err) => runner.check("PMM total_memory > 0", false, err.to_string()),
    }
}

/// Device mapping presence: the fixed VGA window must be readable; its
/// contents are irrelevant.
fn mapping_checks<T: Target, W: Write>(
    chan: &mut QueryChannel<'_, T>,
    runner: &mut CheckRunner<W>,
    layout: &KernelLayout,
) {
    let name = format!("VGA mapping at 0x{:X} is readable", layout.device_probe);
    match chan.read_u32(layout.device_probe) {
        Ok(_) => runner.check(name, true, ""),
        Err(_) => runner.check(name, false, "read failed"),
    }
}
