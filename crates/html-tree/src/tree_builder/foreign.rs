//! Foreign-content (SVG and MathML) tables.
//!
//! @see https://html.spec.whatwg.org/multipage/parsing.html#parsing-main-inforeign

use crate::node::Attribute;

/// HTML start tags that break out of foreign content back into the HTML
/// insertion modes. `font` is special-cased: it breaks out only with a
/// `color`, `face`, or `size` attribute.
pub(crate) static BREAKOUT: &[&str] = &[
    "b", "big", "blockquote", "body", "br", "center", "code", "dd", "div", "dl", "dt", "em",
    "embed", "h1", "h2", "h3", "h4", "h5", "h6", "head", "hr", "i", "img", "li", "listing",
    "menu", "meta", "nobr", "ol", "p", "pre", "ruby", "s", "small", "span", "strong", "strike",
    "sub", "sup", "table", "tt", "u", "ul", "var",
];

/// Lowercased SVG tag names restored to their mixed-case spellings.
pub(crate) static SVG_TAG_NAME_ADJUSTMENTS: &[(&str, &str)] = &[
    ("altglyph", "altGlyph"),
    ("altglyphdef", "altGlyphDef"),
    ("altglyphitem", "altGlyphItem"),
    ("animatecolor", "animateColor"),
    ("animatemotion", "animateMotion"),
    ("animatetransform", "animateTransform"),
    ("clippath", "clipPath"),
    ("feblend", "feBlend"),
    ("fecolormatrix", "feColorMatrix"),
    ("fecomponenttransfer", "feComponentTransfer"),
    ("fecomposite", "feComposite"),
    ("feconvolvematrix", "feConvolveMatrix"),
    ("fediffuselighting", "feDiffuseLighting"),
    ("fedisplacementmap", "feDisplacementMap"),
    ("fedistantlight", "feDistantLight"),
    ("feflood", "feFlood"),
    ("fefunca", "feFuncA"),
    ("fefuncb", "feFuncB"),
    ("fefuncg", "feFuncG"),
    ("fefuncr", "feFuncR"),
    ("fegaussianblur", "feGaussianBlur"),
    ("feimage", "feImage"),
    ("femerge", "feMerge"),
    ("femergenode", "feMergeNode"),
    ("femorphology", "feMorphology"),
    ("feoffset", "feOffset"),
    ("fepointlight", "fePointLight"),
    ("fespecularlighting", "feSpecularLighting"),
    ("fespotlight", "feSpotLight"),
    ("fetile", "feTile"),
    ("feturbulence", "feTurbulence"),
    ("foreignobject", "foreignObject"),
    ("glyphref", "glyphRef"),
    ("lineargradient", "linearGradient"),
    ("radialgradient", "radialGradient"),
    ("textpath", "textPath"),
];

/// MathML attribute-name adjustments.
pub(crate) static MATHML_ATTRIBUTE_ADJUSTMENTS: &[(&str, &str)] =
    &[("definitionurl", "definitionURL")];

/// SVG attribute-name adjustments.
pub(crate) static SVG_ATTRIBUTE_ADJUSTMENTS: &[(&str, &str)] = &[
    ("attributename", "attributeName"),
    ("attributetype", "attributeType"),
    ("basefrequency", "baseFrequency"),
    ("baseprofile", "baseProfile"),
    ("calcmode", "calcMode"),
    ("clippathunits", "clipPathUnits"),
    ("contentscripttype", "contentScriptType"),
    ("contentstyletype", "contentStyleType"),
    ("diffuseconstant", "diffuseConstant"),
    ("edgemode", "edgeMode"),
    ("externalresourcesrequired", "externalResourcesRequired"),
    ("filterres", "filterRes"),
    ("filterunits", "filterUnits"),
    ("glyphref", "glyphRef"),
    ("gradienttransform", "gradientTransform"),
    ("gradientunits", "gradientUnits"),
    ("kernelmatrix", "kernelMatrix"),
    ("kernelunitlength", "kernelUnitLength"),
    ("keypoints", "keyPoints"),
    ("keysplines", "keySplines"),
    ("keytimes", "keyTimes"),
    ("lengthadjust", "lengthAdjust"),
    ("limitingconeangle", "limitingConeAngle"),
    ("markerheight", "markerHeight"),
    ("markerunits", "markerUnits"),
    ("markerwidth", "markerWidth"),
    ("maskcontentunits", "maskContentUnits"),
    ("maskunits", "maskUnits"),
    ("numoctaves", "numOctaves"),
    ("pathlength", "pathLength"),
    ("patterncontentunits", "patternContentUnits"),
    ("patterntransform", "patternTransform"),
    ("patternunits", "patternUnits"),
    ("pointsatx", "pointsAtX"),
    ("pointsaty", "pointsAtY"),
    ("pointsatz", "pointsAtZ"),
    ("preservealpha", "preserveAlpha"),
    ("preserveaspectratio", "preserveAspectRatio"),
    ("primitiveunits", "primitiveUnits"),
    ("refx", "refX"),
    ("refy", "refY"),
    ("repeatcount", "repeatCount"),
    ("repeatdur", "repeatDur"),
    ("requiredextensions", "requiredExtensions"),
    ("requiredfeatures", "requiredFeatures"),
    ("specularconstant", "specularConstant"),
    ("specularexponent", "specularExponent"),
    ("spreadmethod", "spreadMethod"),
    ("startoffset", "startOffset"),
    ("stddeviation", "stdDeviation"),
    ("stitchtiles", "stitchTiles"),
    ("surfacescale", "surfaceScale"),
    ("systemlanguage", "systemLanguage"),
    ("tablevalues", "tableValues"),
    ("targetx", "targetX"),
    ("targety", "targetY"),
    ("textlength", "textLength"),
    ("viewbox", "viewBox"),
    ("viewtarget", "viewTarget"),
    ("xchannelselector", "xChannelSelector"),
    ("ychannelselector", "yChannelSelector"),
    ("zoomandpan", "zoomAndPan"),
];

/// Rewrites attribute keys through an adjustment table.
pub(crate) fn adjust_attribute_names(attrs: &mut [Attribute], adjustments: &[(&str, &str)]) {
    for attr in attrs {
        if let Some((_, adjusted)) = adjustments.iter().find(|(from, _)| *from == attr.key) {
            attr.key = (*adjusted).to_string();
        }
    }
}

/// Splits the `xlink:`, `xml:`, and `xmlns:` attribute prefixes into the
/// attribute namespace.
pub(crate) fn adjust_foreign_attributes(attrs: &mut [Attribute]) {
    for attr in attrs {
        if !attr.key.starts_with('x') {
            continue;
        }
        match attr.key.as_str() {
            "xlink:actuate" | "xlink:arcrole" | "xlink:href" | "xlink:role" | "xlink:show"
            | "xlink:title" | "xlink:type" | "xml:base" | "xml:lang" | "xml:space"
            | "xmlns:xlink" => {
                let colon = attr.key.find(':').unwrap();
                attr.namespace = attr.key[..colon].to_string();
                attr.key = attr.key[colon + 1..].to_string();
            }
            _ => {}
        }
    }
}

/// The mixed-case spelling for a lowercased SVG tag name, if it has one.
pub(crate) fn svg_tag_name_adjustment(name: &str) -> Option<&'static str> {
    SVG_TAG_NAME_ADJUSTMENTS
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
}

pub(crate) fn is_breakout_tag(name: &str) -> bool {
    BREAKOUT.contains(&name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn svg_names_restore_their_case() {
        assert_eq!(svg_tag_name_adjustment("foreignobject"), Some("foreignObject"));
        assert_eq!(svg_tag_name_adjustment("clippath"), Some("clipPath"));
        assert_eq!(svg_tag_name_adjustment("rect"), None);
    }

    #[test]
    fn foreign_attribute_prefixes_split() {
        let mut attrs = vec![
            Attribute::new("xlink:href", "#a"),
            Attribute::new("xml:lang", "en"),
            Attribute::new("xmlns:xlink", "uri"),
            Attribute::new("x", "1"),
        ];
        adjust_foreign_attributes(&mut attrs);
        assert_eq!(attrs[0].namespace, "xlink");
        assert_eq!(attrs[0].key, "href");
        assert_eq!(attrs[1].namespace, "xml");
        assert_eq!(attrs[1].key, "lang");
        assert_eq!(attrs[2].namespace, "xmlns");
        assert_eq!(attrs[2].key, "xlink");
        assert_eq!(attrs[3].namespace, "");
        assert_eq!(attrs[3].key, "x");
    }

    #[test]
    fn attribute_names_adjust_by_table() {
        let mut attrs = vec![
            Attribute::new("viewbox", "0 0 1 1"),
            Attribute::new("definitionurl", "u"),
        ];
        adjust_attribute_names(&mut attrs, SVG_ATTRIBUTE_ADJUSTMENTS);
        assert_eq!(attrs[0].key, "viewBox");
        adjust_attribute_names(&mut attrs, MATHML_ATTRIBUTE_ADJUSTMENTS);
        assert_eq!(attrs[1].key, "definitionURL");
    }
}
