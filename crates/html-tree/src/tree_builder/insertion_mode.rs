//! Insertion modes of the tree constructor.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#the-insertion-mode

/// The sub-state that selects how the next token is processed. Modes form
/// a plain value so the `<template>` mode stack is just a `Vec` of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InsertionMode {
    /// Before anything else; consumes the DOCTYPE if present.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-initial-insertion-mode
    Initial,

    /// Fabricates the `<html>` root when the input doesn't open one.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-before-html-insertion-mode
    BeforeHtml,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-before-head-insertion-mode
    BeforeHead,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inhead
    InHead,

    /// Only reachable with scripting disabled.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inheadnoscript
    InHeadNoscript,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-after-head-insertion-mode
    AfterHead,

    /// The main mode; most content is handled here.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inbody
    InBody,

    /// Raw-text and RCDATA element content, until the matching end tag.
    ///
    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-incdata
    Text,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-intable
    InTable,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-incaption
    InCaption,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-incolgroup
    InColumnGroup,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-intbody
    InTableBody,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-intr
    InRow,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-intd
    InCell,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inselect
    InSelect,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inselectintable
    InSelectInTable,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-intemplate
    InTemplate,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-afterbody
    AfterBody,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inframeset
    InFrameset,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-afterframeset
    AfterFrameset,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-after-after-body-insertion-mode
    AfterAfterBody,

    /// @see https://html.spec.whatwg.org/multipage/parsing.html#the-after-after-frameset-insertion-mode
    AfterAfterFrameset,
}
