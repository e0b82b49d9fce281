//! Runtime helpers injected into generated Lua
//!
//! Only the features a chunk actually uses are emitted, as locals at the top
//! of the chunk, together with the features they depend on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How the runtime helpers reach the generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LuaLibImport {
    /// Helpers are emitted into the chunk itself
    #[default]
    Inline,
    /// Helpers are expected to already exist as globals
    None,
}

/// One helper. Declaration order is emission order; dependencies always
/// come before their dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LuaLibFeature {
    ToString,
    Length,
    Add,
    Nullish,
    Optional,
    Index,
    SetIndex,
    ArrayMethods,
    StringMethods,
    CallMethod,
    Math,
    Error,
    Console,
}

impl LuaLibFeature {
    /// Name the generated code calls the helper by
    pub fn name(self) -> &'static str {
        match self {
            LuaLibFeature::ToString => "__flow_tostring",
            LuaLibFeature::Length => "__flow_len",
            LuaLibFeature::Add => "__flow_add",
            LuaLibFeature::Nullish => "__flow_nullish",
            LuaLibFeature::Optional => "__flow_optional",
            LuaLibFeature::Index => "__flow_index",
            LuaLibFeature::SetIndex => "__flow_set_index",
            LuaLibFeature::ArrayMethods => "__flow_array",
            LuaLibFeature::StringMethods => "__flow_string",
            LuaLibFeature::CallMethod => "__flow_call_method",
            LuaLibFeature::Math => "Math",
            LuaLibFeature::Error => "Error",
            LuaLibFeature::Console => "console",
        }
    }

    fn dependencies(self) -> &'static [LuaLibFeature] {
        match self {
            LuaLibFeature::Add => &[LuaLibFeature::ToString],
            LuaLibFeature::ArrayMethods => &[LuaLibFeature::Length, LuaLibFeature::ToString],
            LuaLibFeature::CallMethod => &[
                LuaLibFeature::ToString,
                LuaLibFeature::ArrayMethods,
                LuaLibFeature::StringMethods,
            ],
            _ => &[],
        }
    }

    fn source(self) -> &'static str {
        match self {
            LuaLibFeature::ToString => TOSTRING,
            LuaLibFeature::Length => LENGTH,
            LuaLibFeature::Add => ADD,
            LuaLibFeature::Nullish => NULLISH,
            LuaLibFeature::Optional => OPTIONAL,
            LuaLibFeature::Index => INDEX,
            LuaLibFeature::SetIndex => SET_INDEX,
            LuaLibFeature::ArrayMethods => ARRAY_METHODS,
            LuaLibFeature::StringMethods => STRING_METHODS,
            LuaLibFeature::CallMethod => CALL_METHOD,
            LuaLibFeature::Math => MATH,
            LuaLibFeature::Error => ERROR,
            LuaLibFeature::Console => CONSOLE,
        }
    }

    /// Helper backing a Flow global name, if any
    pub fn for_global(name: &str) -> Option<LuaLibFeature> {
        match name {
            "Math" => Some(LuaLibFeature::Math),
            "Error" => Some(LuaLibFeature::Error),
            "console" => Some(LuaLibFeature::Console),
            _ => None,
        }
    }
}

/// Names always in scope for Flow code
pub const FLOW_GLOBALS: &[&str] = &[
    // provided by the runtime helpers
    "Math",
    "Error",
    "console",
    "NaN",
    "Infinity",
    // Lua base library and loaded standard modules
    "print",
    "tostring",
    "tonumber",
    "type",
    "pairs",
    "ipairs",
    "next",
    "select",
    "error",
    "assert",
    "pcall",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "setmetatable",
    "getmetatable",
    "string",
    "table",
    "math",
    "utf8",
    "coroutine",
];

/// Resolve dependencies and return the emission-ordered feature list
pub fn resolve(features: impl IntoIterator<Item = LuaLibFeature>) -> Vec<LuaLibFeature> {
    let mut resolved = BTreeSet::new();
    let mut pending: Vec<LuaLibFeature> = features.into_iter().collect();

    while let Some(feature) = pending.pop() {
        if resolved.insert(feature) {
            pending.extend_from_slice(feature.dependencies());
        }
    }

    resolved.into_iter().collect()
}

/// Lua source for the given features, dependencies included
pub fn render(features: &[LuaLibFeature]) -> String {
    resolve(features.iter().copied())
        .into_iter()
        .map(LuaLibFeature::source)
        .collect::<Vec<_>>()
        .join("\n")
}

const TOSTRING: &str = r#"local function __flow_tostring(value)
    if value == nil then
        return "null"
    elseif math.type(value) == "float" then
        if value ~= value then
            return "NaN"
        elseif value == math.huge then
            return "Infinity"
        elseif value == -math.huge then
            return "-Infinity"
        elseif value == math.floor(value) and math.abs(value) < 1e15 then
            return string.format("%d", value)
        end
    end
    return tostring(value)
end
"#;

const LENGTH: &str = r#"local function __flow_len(value)
    local kind = type(value)
    if kind == "string" then
        return #value
    elseif kind == "table" then
        local marked = rawget(value, "____arrayLength")
        if marked ~= nil then
            return marked
        end
        local field = rawget(value, "length")
        if field ~= nil then
            return field
        end
        return #value
    end
    return nil
end
"#;

const ADD: &str = r#"local function __flow_add(a, b)
    if type(a) == "string" or type(b) == "string" then
        return __flow_tostring(a) .. __flow_tostring(b)
    end
    return a + b
end
"#;

const NULLISH: &str = r#"local function __flow_nullish(value, fallback)
    if value == nil then
        return fallback()
    end
    return value
end
"#;

const OPTIONAL: &str = r#"local function __flow_optional(object, key)
    if object == nil then
        return nil
    end
    return object[key]
end
"#;

const INDEX: &str = r#"local function __flow_index(object, key)
    if type(key) == "number" then
        if type(object) == "string" then
            local char = string.sub(object, key + 1, key + 1)
            if char == "" then
                return nil
            end
            return char
        end
        return object[key + 1]
    end
    return object[key]
end
"#;

const SET_INDEX: &str = r#"local function __flow_set_index(object, key, value)
    if type(key) ~= "number" then
        object[key] = value
        return
    end
    object[key + 1] = value
    local marked = rawget(object, "____arrayLength")
    if marked ~= nil and key + 1 > marked then
        object.____arrayLength = key + 1
    end
end
"#;

const ARRAY_METHODS: &str = r##"local __flow_array = {}
local function __flow_array_resize(array, length)
    if rawget(array, "____arrayLength") ~= nil then
        array.____arrayLength = length
    end
end
function __flow_array.push(self, ...)
    local length = __flow_len(self)
    local count = select("#", ...)
    for i = 1, count do
        self[length + i] = select(i, ...)
    end
    __flow_array_resize(self, length + count)
    return length + count
end
function __flow_array.pop(self)
    local length = __flow_len(self)
    if length == 0 then
        return nil
    end
    local value = self[length]
    self[length] = nil
    __flow_array_resize(self, length - 1)
    return value
end
function __flow_array.map(self, fn)
    local result, length, holes = {}, __flow_len(self), false
    for i = 1, length do
        local value = fn(self[i], i - 1, self)
        result[i] = value
        holes = holes or value == nil
    end
    if holes then
        result.____arrayLength = length
    end
    return result
end
function __flow_array.filter(self, fn)
    local result, count = {}, 0
    for i = 1, __flow_len(self) do
        local value = self[i]
        if fn(value, i - 1, self) then
            count = count + 1
            result[count] = value
        end
    end
    return result
end
function __flow_array.forEach(self, fn)
    for i = 1, __flow_len(self) do
        fn(self[i], i - 1, self)
    end
end
function __flow_array.reduce(self, fn, ...)
    local first, accumulator = 1, ...
    if select("#", ...) == 0 then
        first, accumulator = 2, self[1]
    end
    for i = first, __flow_len(self) do
        accumulator = fn(accumulator, self[i], i - 1, self)
    end
    return accumulator
end
function __flow_array.find(self, fn)
    for i = 1, __flow_len(self) do
        local value = self[i]
        if fn(value, i - 1, self) then
            return value
        end
    end
    return nil
end
function __flow_array.some(self, fn)
    for i = 1, __flow_len(self) do
        if fn(self[i], i - 1, self) then
            return true
        end
    end
    return false
end
function __flow_array.every(self, fn)
    for i = 1, __flow_len(self) do
        if not fn(self[i], i - 1, self) then
            return false
        end
    end
    return true
end
function __flow_array.indexOf(self, search)
    for i = 1, __flow_len(self) do
        if self[i] == search then
            return i - 1
        end
    end
    return -1
end
function __flow_array.includes(self, search)
    return __flow_array.indexOf(self, search) >= 0
end
function __flow_array.join(self, separator)
    local parts = {}
    for i = 1, __flow_len(self) do
        local value = self[i]
        parts[i] = value == nil and "" or __flow_tostring(value)
    end
    return table.concat(parts, separator == nil and "," or separator)
end
function __flow_array.slice(self, first, last)
    local length = __flow_len(self)
    first = first or 0
    last = last or length
    if first < 0 then
        first = math.max(length + first, 0)
    end
    if last < 0 then
        last = length + last
    end
    last = math.min(last, length)
    local result, count = {}, 0
    for i = first + 1, last do
        count = count + 1
        result[count] = self[i]
    end
    return result
end
function __flow_array.concat(self, ...)
    local result, count = {}, 0
    for i = 1, __flow_len(self) do
        count = count + 1
        result[count] = self[i]
    end
    for i = 1, select("#", ...) do
        local item = select(i, ...)
        if type(item) == "table" then
            for j = 1, __flow_len(item) do
                count = count + 1
                result[count] = item[j]
            end
        else
            count = count + 1
            result[count] = item
        end
    end
    return result
end
function __flow_array.reverse(self)
    local length = __flow_len(self)
    for i = 1, length // 2 do
        self[i], self[length - i + 1] = self[length - i + 1], self[i]
    end
    return self
end
"##;

const STRING_METHODS: &str = r#"local __flow_string = {}
function __flow_string.toUpperCase(self)
    return string.upper(self)
end
function __flow_string.toLowerCase(self)
    return string.lower(self)
end
function __flow_string.trim(self)
    return (string.gsub(self, "^%s*(.-)%s*$", "%1"))
end
function __flow_string.includes(self, search)
    return string.find(self, search, 1, true) ~= nil
end
function __flow_string.startsWith(self, prefix)
    return string.sub(self, 1, #prefix) == prefix
end
function __flow_string.endsWith(self, suffix)
    return suffix == "" or string.sub(self, -#suffix) == suffix
end
function __flow_string.indexOf(self, search)
    local found = string.find(self, search, 1, true)
    if found == nil then
        return -1
    end
    return found - 1
end
function __flow_string.charAt(self, index)
    return string.sub(self, index + 1, index + 1)
end
function __flow_string.slice(self, first, last)
    local length = #self
    first = first or 0
    last = last or length
    if first < 0 then
        first = math.max(length + first, 0)
    end
    if last < 0 then
        last = length + last
    end
    return string.sub(self, first + 1, last)
end
function __flow_string.split(self, separator)
    local result = {}
    if separator == "" then
        for i = 1, #self do
            result[i] = string.sub(self, i, i)
        end
        return result
    end
    local start, count = 1, 0
    while true do
        local first, last = string.find(self, separator, start, true)
        if first == nil then
            break
        end
        count = count + 1
        result[count] = string.sub(self, start, first - 1)
        start = last + 1
    end
    result[count + 1] = string.sub(self, start)
    return result
end
function __flow_string.repeat_(self, count)
    return string.rep(self, count)
end
__flow_string["repeat"] = __flow_string.repeat_
"#;

const CALL_METHOD: &str = r#"local function __flow_call_method(object, name, ...)
    local kind = type(object)
    if kind == "table" then
        local method = object[name]
        if method ~= nil then
            return method(...)
        end
        method = __flow_array[name]
        if method ~= nil then
            return method(object, ...)
        end
    elseif kind == "string" then
        local method = __flow_string[name]
        if method ~= nil then
            return method(object, ...)
        end
    end
    if name == "toString" then
        return __flow_tostring(object)
    end
    error("TypeError: " .. __flow_tostring(name) .. " is not a function", 2)
end
"#;

const MATH: &str = r#"local Math = {
    PI = math.pi,
    E = math.exp(1),
    abs = math.abs,
    ceil = math.ceil,
    floor = math.floor,
    sqrt = math.sqrt,
    sin = math.sin,
    cos = math.cos,
    tan = math.tan,
    exp = math.exp,
    log = math.log,
    max = math.max,
    min = math.min,
    random = math.random,
}
function Math.round(x)
    return math.floor(x + 0.5)
end
function Math.pow(x, y)
    return x ^ y
end
function Math.trunc(x)
    if x < 0 then
        return math.ceil(x)
    end
    return math.floor(x)
end
function Math.sign(x)
    if x > 0 then
        return 1
    elseif x < 0 then
        return -1
    end
    return 0
end
"#;

const ERROR: &str = r#"local function Error(message)
    return {name = "Error", message = message}
end
"#;

const CONSOLE: &str = r#"local console = {log = print, info = print, warn = print, error = print}
"#;
