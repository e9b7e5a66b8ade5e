// SPDX-License-Identifier: GPL-3.0-or-later
pub mod admin_key;
pub mod ip_filter;
